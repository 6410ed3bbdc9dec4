//! Discovery of physical-layout descriptions that sit next to a keymap in its repository.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::info;
use walkdir::WalkDir;

/// Physical-layout file copied out of an extracted snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutHandle {
    pub content: Vec<u8>,
    /// Location relative to the repository root, for display and format detection.
    pub source_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutFormat {
    /// QMK `info.json`-style description.
    QmkInfoJson,
    /// Devicetree (`.dtsi`) physical layout.
    DtsLayout,
}

impl LayoutFormat {
    /// Classify a file by name: `.json` is QMK, anything else devicetree.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::QmkInfoJson,
            _ => Self::DtsLayout,
        }
    }

    /// Draw-config option the renderer expects this format under.
    #[must_use]
    pub fn option_key(self) -> &'static str {
        match self {
            Self::QmkInfoJson => "qmk_info_json",
            Self::DtsLayout => "dts_layout",
        }
    }
}

impl LayoutHandle {
    #[must_use]
    pub fn format(&self) -> LayoutFormat {
        LayoutFormat::for_path(&self.source_path)
    }
}

/// Layout description handed to the renderer in place of the document's `layout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutOverride {
    pub format: LayoutFormat,
    pub content: Vec<u8>,
}

impl LayoutOverride {
    /// Build an override from a file supplied out of band (e.g. an upload).
    #[must_use]
    pub fn from_file(name: &str, content: Vec<u8>) -> Self {
        Self {
            format: LayoutFormat::for_path(Path::new(name)),
            content,
        }
    }

    /// `{ "qmk_info_json": .. }` or `{ "dts_layout": .. }`, content as text.
    #[must_use]
    pub fn to_layout_value(&self) -> Value {
        let mut layout = Map::new();
        layout.insert(
            self.format.option_key().to_string(),
            Value::String(String::from_utf8_lossy(&self.content).into_owned()),
        );
        Value::Object(layout)
    }
}

impl From<&LayoutHandle> for LayoutOverride {
    fn from(handle: &LayoutHandle) -> Self {
        Self {
            format: handle.format(),
            content: handle.content.clone(),
        }
    }
}

/// Search `root` for a physical layout matching `keyboard_name`.
///
/// `<name>.json` anywhere in the tree takes precedence; otherwise the first
/// `<name>-layout*.dtsi` is used. Each search walks depth-first in lexical order and
/// stops at its first hit, so further candidates are ignored.
///
/// # Errors
///
/// Returns the I/O error raised while copying the matching file's bytes.
pub fn discover_layout(root: &Path, keyboard_name: &str) -> std::io::Result<Option<LayoutHandle>> {
    let json_name = format!("{keyboard_name}.json");
    let dts_prefix = format!("{keyboard_name}-layout");
    let found = first_file(root, |name| name == json_name).or_else(|| {
        first_file(root, |name| {
            name.starts_with(&dts_prefix) && name.ends_with(".dtsi")
        })
    });
    let Some(path) = found else {
        return Ok(None);
    };

    let content = fs_err::read(&path)?;
    let source_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
    info!(
        "Found physical layout at {}, setting layout override",
        source_path.display()
    );
    Ok(Some(LayoutHandle {
        content,
        source_path,
    }))
}

fn first_file(root: &Path, matches: impl Fn(&str) -> bool) -> Option<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| {
            entry.file_type().is_file() && entry.file_name().to_str().is_some_and(&matches)
        })
        .map(walkdir::DirEntry::into_path)
}
