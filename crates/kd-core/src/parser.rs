//! Seam over the external keymap parser plus normalization of its output.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::process::run_command_with_input;

/// Prepended to documents that carry no `layout`, so the user knows what to fill in.
pub const LAYOUT_PREAMBLE: &str = "\
# FILL IN below field with a value like {qmk_keyboard: ferris/sweep}
# or {ortho_layout: {split: true, rows: 3, columns: 5, thumbs: 2}}
# see https://github.com/caksoylar/keymap-drawer/blob/main/KEYMAP_SPEC.md#layout
#layout:
";

/// Parser options; include paths are the only field the pipeline touches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseConfig {
    #[serde(default)]
    pub zmk_additional_includes: Vec<PathBuf>,
    /// Remaining parser options, passed through untouched.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl ParseConfig {
    /// Append an include directory unless it is already registered.
    pub fn add_include(&mut self, path: &Path) -> bool {
        if self.zmk_additional_includes.iter().any(|known| known == path) {
            return false;
        }
        self.zmk_additional_includes.push(path.to_path_buf());
        true
    }
}

/// Structured keymap as produced by the parser and consumed by the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeymapDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Value>,
    pub layers: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combos: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_config: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl KeymapDocument {
    /// Read keymap YAML, such as a normalized document or a hand-written keymap.
    ///
    /// # Errors
    ///
    /// Fails on empty input or when the text is not a keymap document.
    pub fn from_normalized(text: &str) -> Result<Self> {
        let has_content = text
            .lines()
            .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'));
        if !has_content {
            bail!("Keymap is empty, nothing to draw");
        }
        let value: Value = serde_yaml::from_str(text).context("keymap is not valid YAML")?;
        if value.get("layers").is_none() {
            bail!("Keymap needs to be specified via the \"layers\" field");
        }
        serde_json::from_value(value).context("keymap does not match the keymap document shape")
    }
}

/// Which keymap-drawer parser reads the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ParserKind {
    /// ZMK devicetree `.keymap`.
    #[default]
    Zmk,
    /// QMK configurator `keymap.json`.
    Qmk,
    /// Kanata `.kbd`.
    Kanata,
}

impl ParserKind {
    /// Guess the parser from a file extension.
    #[must_use]
    pub fn for_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "keymap" => Some(Self::Zmk),
            "json" => Some(Self::Qmk),
            "kbd" => Some(Self::Kanata),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zmk => "zmk",
            Self::Qmk => "qmk",
            Self::Kanata => "kanata",
        }
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown keymap kind '{0}' (expected zmk, qmk or kanata)")]
pub struct UnknownParserKind(String);

impl FromStr for ParserKind {
    type Err = UnknownParserKind;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "zmk" => Ok(Self::Zmk),
            "qmk" => Ok(Self::Qmk),
            "kanata" => Ok(Self::Kanata),
            _ => Err(UnknownParserKind(raw.to_string())),
        }
    }
}

/// The keymap handed to the parser.
#[derive(Debug, Clone, Copy)]
pub struct KeymapSource<'a> {
    pub path: &'a Path,
    pub text: &'a str,
    pub kind: ParserKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedKeymap {
    pub document: KeymapDocument,
    pub log: String,
}

pub trait KeymapParser: Send + Sync {
    fn parse(
        &self,
        source: &KeymapSource<'_>,
        num_cols: u32,
        config: &ParseConfig,
    ) -> Result<ParsedKeymap>;
}

/// Render the parser output as keymap YAML.
///
/// A non-blank `layout_override` (YAML or JSON) replaces the document's `layout`.
/// Layer and key order are kept and non-ASCII legends are written as-is. Documents
/// still lacking a layout get [`LAYOUT_PREAMBLE`] in front.
///
/// # Errors
///
/// Returns the YAML error when the override cannot be parsed.
pub fn normalize_document(
    mut document: KeymapDocument,
    layout_override: Option<&str>,
) -> std::result::Result<String, serde_yaml::Error> {
    if let Some(raw) = layout_override.filter(|raw| !raw.trim().is_empty()) {
        let layout: Value = serde_yaml::from_str(raw)?;
        document.layout = Some(layout).filter(|value| !value.is_null());
    }
    let mut out = serde_yaml::to_string(&document)?;
    if document.layout.is_none() {
        out.insert_str(0, LAYOUT_PREAMBLE);
    }
    Ok(out)
}

const PARSE_SCRIPT: &str = r#"
import json, sys
from keymap_drawer.config import ParseConfig
from keymap_drawer.parse import KanataKeymapParser, QmkJsonParser, ZmkKeymapParser
parsers = {"zmk": ZmkKeymapParser, "qmk": QmkJsonParser, "kanata": KanataKeymapParser}
kind, keymap_path = sys.argv[1], sys.argv[2]
num_cols, config = int(sys.argv[3]), json.loads(sys.argv[4])
with open(keymap_path, encoding="utf-8") as keymap:
    parsed = parsers[kind](ParseConfig(**config), num_cols).parse(keymap)
json.dump(parsed, sys.stdout, ensure_ascii=False)
"#;

/// Runs one of keymap-drawer's parsers through a Python interpreter.
///
/// The document comes back as JSON on stdout; everything the parser logs on stderr
/// becomes the diagnostic log.
#[derive(Debug, Clone)]
pub struct PythonKeymapParser {
    python: String,
    timeout: Option<Duration>,
}

impl PythonKeymapParser {
    #[must_use]
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            timeout: None,
        }
    }

    /// Kill the interpreter when a parse runs longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn args(source: &KeymapSource<'_>, num_cols: u32, config: &ParseConfig) -> Result<Vec<String>> {
        Ok(vec![
            "-c".to_string(),
            PARSE_SCRIPT.to_string(),
            source.kind.as_str().to_string(),
            source.path.display().to_string(),
            num_cols.to_string(),
            serde_json::to_string(config)?,
        ])
    }
}

impl KeymapParser for PythonKeymapParser {
    fn parse(
        &self,
        source: &KeymapSource<'_>,
        num_cols: u32,
        config: &ParseConfig,
    ) -> Result<ParsedKeymap> {
        let args = Self::args(source, num_cols, config)?;
        let cwd = source
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let output = run_command_with_input(&self.python, &args, cwd, None, self.timeout)?;
        if !output.success() {
            bail!("{} parser failed: {}", source.kind, output.stderr.trim());
        }
        let document = serde_json::from_str(&output.stdout)
            .context("keymap parser did not return a keymap document")?;
        Ok(ParsedKeymap {
            document,
            log: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(layout: Option<Value>) -> KeymapDocument {
        let mut layers = IndexMap::new();
        layers.insert("base".to_string(), json!([["Q", "W"], ["A", "S"]]));
        layers.insert("nav".to_string(), json!([["Up", "Down"]]));
        KeymapDocument {
            layout,
            layers,
            ..KeymapDocument::default()
        }
    }

    #[test]
    fn missing_layout_gets_preamble() {
        let text = normalize_document(document(None), None).unwrap();
        assert!(text.starts_with(LAYOUT_PREAMBLE));
        let body = &text[LAYOUT_PREAMBLE.len()..];
        let value: Value = serde_yaml::from_str(body).unwrap();
        assert_eq!(value["layers"]["base"][0][1], "W");
        assert!(value.get("layout").is_none());
    }

    #[test]
    fn layer_order_is_preserved() {
        let text = normalize_document(document(Some(json!({"qmk_keyboard": "corne"}))), None)
            .unwrap();
        let base = text.find("base:").unwrap();
        let nav = text.find("nav:").unwrap();
        assert!(base < nav);
        assert!(text.find("layout:").unwrap() < base);
        assert!(!text.contains("FILL IN"));
    }

    #[test]
    fn unicode_legends_are_written_verbatim() {
        let mut parsed = document(Some(json!({"qmk_keyboard": "corne"})));
        parsed.layers.insert("sym".into(), json!([["⇧", "Ü"]]));
        let text = normalize_document(parsed, None).unwrap();
        assert!(text.contains('⇧'), "{text}");
        assert!(text.contains('Ü'), "{text}");
        assert!(!text.contains("\\u"), "{text}");
    }

    #[test]
    fn explicit_layout_replaces_parsed_one() {
        let parsed = document(Some(json!({"qmk_keyboard": "corne"})));
        let text =
            normalize_document(parsed, Some(r#"{"qmk_keyboard": "ferris/sweep"}"#)).unwrap();
        let value: Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(value["layout"]["qmk_keyboard"], "ferris/sweep");
    }

    #[test]
    fn flow_style_layout_override_is_accepted() {
        let text = normalize_document(document(None), Some("{qmk_keyboard: ferris/sweep}")).unwrap();
        assert!(!text.starts_with(LAYOUT_PREAMBLE));
        let value: Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(value["layout"]["qmk_keyboard"], "ferris/sweep");
    }

    #[test]
    fn blank_layout_override_is_ignored() {
        let parsed = document(Some(json!({"qmk_keyboard": "corne"})));
        let text = normalize_document(parsed, Some("  ")).unwrap();
        assert!(text.contains("corne"));
    }

    #[test]
    fn invalid_layout_override_is_an_error() {
        assert!(normalize_document(document(None), Some("{qmk_keyboard: x")).is_err());
    }

    #[test]
    fn normalized_text_reads_back() {
        let original = document(None);
        let text = normalize_document(original.clone(), None).unwrap();
        assert_eq!(KeymapDocument::from_normalized(&text).unwrap(), original);
    }

    #[test]
    fn hand_written_keymap_yaml_is_read() {
        let text = "layout: {qmk_keyboard: corne_rotated}\nlayers:\n  base: [[Q, W]]\n";
        let parsed = KeymapDocument::from_normalized(text).unwrap();
        assert_eq!(parsed.layout, Some(json!({"qmk_keyboard": "corne_rotated"})));
        assert_eq!(parsed.layers["base"], json!([["Q", "W"]]));
    }

    #[test]
    fn reading_requires_layers() {
        let err = KeymapDocument::from_normalized("combos: []\n").unwrap_err();
        assert!(err.to_string().contains("\"layers\""));
        let err = KeymapDocument::from_normalized(LAYOUT_PREAMBLE).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn parser_kind_follows_the_extension() {
        assert_eq!(ParserKind::for_path(Path::new("config/corne.keymap")), Some(ParserKind::Zmk));
        assert_eq!(ParserKind::for_path(Path::new("keymap.json")), Some(ParserKind::Qmk));
        assert_eq!(ParserKind::for_path(Path::new("sweep.kbd")), Some(ParserKind::Kanata));
        assert_eq!(ParserKind::for_path(Path::new("README.md")), None);
        assert_eq!("QMK".parse::<ParserKind>(), Ok(ParserKind::Qmk));
        assert!("kmonad".parse::<ParserKind>().is_err());
    }

    #[test]
    fn parser_script_receives_the_kind_first() {
        let source = KeymapSource {
            path: Path::new("/tmp/sweep.kbd"),
            text: "",
            kind: ParserKind::Kanata,
        };
        let args = PythonKeymapParser::args(&source, 5, &ParseConfig::default()).unwrap();
        assert_eq!(args[2..5], ["kanata", "/tmp/sweep.kbd", "5"]);
        assert!(args[1].contains("KanataKeymapParser"));
    }

    #[test]
    fn parse_config_serializes_includes_and_options() {
        let mut config = ParseConfig::default();
        config
            .options
            .insert("preprocess".into(), Value::Bool(false));
        assert!(config.add_include(Path::new("/tmp/include")));
        assert!(!config.add_include(Path::new("/tmp/include")));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            json!({"zmk_additional_includes": ["/tmp/include"], "preprocess": false})
        );
    }
}
