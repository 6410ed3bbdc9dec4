//! URL → commit → snapshot → extracted tree → parser, in one blocking call.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::archive::{extract_snapshot, ArchiveError};
use crate::forge::{parse_keymap_url, resolve_commit, ForgeApi, ForgeError, UrlIssue};
use crate::layout::{discover_layout, LayoutHandle};
use crate::modules::{bootstrap_modules, WestRunner};
use crate::parser::{
    normalize_document, KeymapParser, KeymapSource, ParseConfig, ParsedKeymap, ParserKind,
};
use crate::snapshot::SnapshotCache;

/// Headline shown when the snapshot download fails.
pub const FETCH_FAILED_MESSAGE: &str = "Could not get repo contents, make sure you use a branch name or commit SHA and not a tag in the URL";
/// Headline shown for every other pipeline failure.
pub const PARSE_FAILED_MESSAGE: &str = "Error while parsing keymap from URL";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlIssue),
    #[error("failed to resolve ref")]
    Resolve(#[source] ForgeError),
    #[error("failed to download repository snapshot")]
    Fetch(#[source] ForgeError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("Could not find '{path}' in the repo, please check URL")]
    MissingKeymap { path: String },
    #[error("Could not read keymap file '{}'", .path.display())]
    ReadKeymap {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read the repository snapshot")]
    Io(#[from] io::Error),
    #[error("keymap parser failed: {0:#}")]
    Parser(anyhow::Error),
    #[error("layout override is not valid YAML or JSON")]
    InvalidLayoutOverride(#[source] serde_yaml::Error),
}

impl PipelineError {
    /// Headline for the end user; validation and structural errors are shown verbatim.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Fetch(_) => FETCH_FAILED_MESSAGE.to_string(),
            Self::InvalidUrl(issue) => issue.to_string(),
            Self::MissingKeymap { .. } | Self::ReadKeymap { .. } | Self::Archive(_) => {
                self.to_string()
            }
            _ => PARSE_FAILED_MESSAGE.to_string(),
        }
    }

    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidUrl(issue) => issue.hint(),
            Self::Resolve(err) | Self::Fetch(err) => err.hint(),
            Self::MissingKeymap { .. } => {
                Some("Check that the path after /blob/<ref>/ exists at that ref.")
            }
            Self::InvalidLayoutOverride(_) => {
                Some("Provide the layout as a mapping, e.g. {qmk_keyboard: corne_rotated}")
            }
            Self::Archive(_) | Self::ReadKeymap { .. } | Self::Io(_) | Self::Parser(_) => None,
        }
    }

    /// Whether the failure happened before any network access.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidUrl(_))
    }
}

/// Terminal result of a successful pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    /// Normalized keymap text.
    pub document: String,
    /// Module-update warnings followed by the parser log.
    pub log: String,
    /// Physical layout found next to the keymap, copied out of the snapshot.
    pub layout: Option<LayoutHandle>,
}

/// The retrieval pipeline wired to its collaborators.
#[derive(Clone, Copy)]
pub struct Pipeline<'a> {
    web_host: &'a str,
    forge: &'a dyn ForgeApi,
    snapshots: &'a SnapshotCache,
    west: &'a dyn WestRunner,
    parser: &'a dyn KeymapParser,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(
        web_host: &'a str,
        forge: &'a dyn ForgeApi,
        snapshots: &'a SnapshotCache,
        west: &'a dyn WestRunner,
        parser: &'a dyn KeymapParser,
    ) -> Self {
        Self {
            web_host,
            forge,
            snapshots,
            west,
            parser,
        }
    }

    /// Fetch the keymap behind `url` and parse it.
    ///
    /// `config` gains the include directories surfaced by module bootstrapping. Those
    /// paths point into the scratch tree, which is gone once this returns.
    /// A non-blank `layout` (YAML or JSON) replaces whatever layout the parser inferred.
    ///
    /// # Errors
    ///
    /// URL problems fail before any network call. Ref-resolution, download,
    /// extraction, missing-keymap and parser failures are returned as the matching
    /// [`PipelineError`]; module-fetch trouble only lands in the log.
    pub fn parse_keymap_url(
        &self,
        url: &str,
        config: &mut ParseConfig,
        num_cols: u32,
        layout: Option<&str>,
    ) -> Result<ParseOutcome, PipelineError> {
        let location = parse_keymap_url(url, self.web_host)?;
        let coordinate = &location.coordinate;
        let commit = resolve_commit(self.forge, coordinate).map_err(PipelineError::Resolve)?;
        let archive = self
            .snapshots
            .fetch_archive(self.forge, &coordinate.owner, &coordinate.repo, &commit)
            .map_err(PipelineError::Fetch)?;

        let tree = extract_snapshot(&archive)?;
        let keymap_file = tree.root().join(&location.keymap_path);
        if !keymap_file.is_file() {
            return Err(PipelineError::MissingKeymap {
                path: location.keymap_path.display().to_string(),
            });
        }

        let report = bootstrap_modules(tree.root(), config, self.west);
        let layout_handle = match location.keyboard_name() {
            Some(name) => discover_layout(tree.root(), name)?,
            None => None,
        };

        let text = fs_err::read_to_string(&keymap_file)?;
        let source = KeymapSource {
            path: &keymap_file,
            text: &text,
            kind: ParserKind::Zmk,
        };
        let (document, parser_log) = self.parse_source(&source, num_cols, config, layout)?;

        let mut log = report.diagnostics;
        log.push(parser_log);

        let scratch = tree.scratch_dir().to_path_buf();
        if let Err(err) = tree.close() {
            warn!(%err, scratch = %scratch.display(), "failed to remove extracted snapshot");
        }
        debug!(%commit, "keymap parsed from snapshot");

        Ok(ParseOutcome {
            document,
            log: log.join("\n"),
            layout: layout_handle,
        })
    }

    /// Parse a keymap that is already on disk with the parser for `kind`.
    ///
    /// No forge, snapshot or module work happens; the text only goes through the
    /// parser and the same normalization as [`Pipeline::parse_keymap_url`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ReadKeymap`] when the file cannot be read, otherwise
    /// the parser and layout-override failures.
    pub fn parse_keymap_file(
        &self,
        path: &Path,
        kind: ParserKind,
        config: &ParseConfig,
        num_cols: u32,
        layout: Option<&str>,
    ) -> Result<ParseOutcome, PipelineError> {
        let text = fs_err::read_to_string(path).map_err(|source| PipelineError::ReadKeymap {
            path: path.to_path_buf(),
            source,
        })?;
        let source = KeymapSource {
            path,
            text: &text,
            kind,
        };
        let (document, log) = self.parse_source(&source, num_cols, config, layout)?;
        debug!(%kind, path = %path.display(), "keymap parsed from file");
        Ok(ParseOutcome {
            document,
            log,
            layout: None,
        })
    }

    fn parse_source(
        &self,
        source: &KeymapSource<'_>,
        num_cols: u32,
        config: &ParseConfig,
        layout: Option<&str>,
    ) -> Result<(String, String), PipelineError> {
        let ParsedKeymap { document, log } = self
            .parser
            .parse(source, num_cols, config)
            .map_err(PipelineError::Parser)?;
        let document =
            normalize_document(document, layout).map_err(PipelineError::InvalidLayoutOverride)?;
        Ok((document, log))
    }
}
