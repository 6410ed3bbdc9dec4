use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use super::RepoCoordinate;

/// File extension carried by ZMK keymap sources.
pub const KEYMAP_EXTENSION: &str = ".keymap";

/// A keymap file addressed inside a forge repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeymapLocation {
    pub coordinate: RepoCoordinate,
    /// Path of the keymap relative to the repository root.
    pub keymap_path: PathBuf,
}

impl KeymapLocation {
    /// File stem used to look for companion layout descriptions.
    #[must_use]
    pub fn keyboard_name(&self) -> Option<&str> {
        self.keymap_path.file_stem().and_then(|stem| stem.to_str())
    }
}

/// Reasons a keymap URL is rejected before any network access.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UrlIssue {
    #[error("Please provide a valid URL (got '{url}')")]
    Malformed { url: String },
    #[error("Please provide a {expected} URL (got host '{host}')")]
    WrongHost { expected: String, host: String },
    #[error("Please provide URL for a file (got path '{path}')")]
    NotAFile { path: String },
    #[error("Please provide URL to a .keymap file (got '{file}')")]
    WrongExtension { file: String },
}

impl UrlIssue {
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Malformed { .. } | Self::WrongHost { .. } => {
                Some("Expected a URL like https://github.com/<owner>/<repo>/blob/<ref>/<path/to/file.keymap>")
            }
            Self::NotAFile { .. } => Some(
                "Open the keymap file in the repository view and copy its URL; it contains '/blob/<ref>/'.",
            ),
            Self::WrongExtension { .. } => Some("Point the URL at the .keymap file itself."),
        }
    }
}

/// Add the `https` scheme to bare and scheme-relative inputs.
fn normalize_input(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("//") {
        format!("https:{raw}")
    } else if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    }
}

/// Validate a forge blob URL and split it into its repository coordinate and keymap path.
///
/// Accepted shape: `https://<web_host>/<owner>/<repo>/blob/<ref>/<path/to/file>.keymap`.
/// Inputs without a scheme, or scheme-relative ones (`//github.com/...`), are
/// normalized to `https` first.
///
/// # Errors
///
/// Returns the first [`UrlIssue`] the input violates.
pub fn parse_keymap_url(raw: &str, web_host: &str) -> Result<KeymapLocation, UrlIssue> {
    let normalized = normalize_input(raw);
    let url = Url::parse(&normalized).map_err(|_| UrlIssue::Malformed {
        url: raw.trim().to_string(),
    })?;

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if url.scheme() != "https" {
        return Err(UrlIssue::WrongHost {
            expected: web_host.to_string(),
            host: format!("{}://{host}", url.scheme()),
        });
    }
    if host != web_host.to_ascii_lowercase() {
        return Err(UrlIssue::WrongHost {
            expected: web_host.to_string(),
            host,
        });
    }

    let segments = decoded_segments(&url).ok_or_else(|| UrlIssue::Malformed {
        url: raw.trim().to_string(),
    })?;
    if segments.len() < 5 || segments[2] != "blob" {
        return Err(UrlIssue::NotAFile {
            path: url.path().to_string(),
        });
    }

    let file = &segments[segments.len() - 1];
    if !file.ends_with(KEYMAP_EXTENSION) {
        return Err(UrlIssue::WrongExtension {
            file: file.clone(),
        });
    }

    let keymap_path = normalize_repo_relative_path(&segments[4..]).ok_or_else(|| {
        UrlIssue::NotAFile {
            path: url.path().to_string(),
        }
    })?;

    Ok(KeymapLocation {
        coordinate: RepoCoordinate {
            owner: segments[0].clone(),
            repo: segments[1].clone(),
            reference: segments[3].clone(),
        },
        keymap_path,
    })
}

/// Non-empty path segments with percent-escapes resolved; `None` for non-UTF-8 escapes.
fn decoded_segments(url: &Url) -> Option<Vec<String>> {
    let Some(segments) = url.path_segments() else {
        return Some(Vec::new());
    };
    segments
        .filter(|seg| !seg.is_empty())
        .map(|seg| {
            percent_decode_str(seg)
                .decode_utf8()
                .ok()
                .map(|decoded| decoded.into_owned())
        })
        .collect()
}

fn normalize_repo_relative_path(parts: &[String]) -> Option<PathBuf> {
    let joined = parts.join("/");
    let mut normalized = PathBuf::new();
    for component in Path::new(&joined).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => normalized.push(part),
            _ => return None,
        }
    }
    if normalized.as_os_str().is_empty() {
        None
    } else {
        Some(normalized)
    }
}
