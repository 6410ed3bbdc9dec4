//! Seam over the external SVG renderer.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::layout::LayoutOverride;
use crate::parser::KeymapDocument;
use crate::process::run_command_with_input;

/// SVG produced by the renderer plus its log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub svg: String,
    pub log: String,
}

pub trait KeymapRenderer: Send + Sync {
    /// Draw `document` against `layout` with the already merged `draw_config`.
    fn render(&self, document: &KeymapDocument, draw_config: &Value, layout: &Value)
        -> Result<Rendered>;
}

/// Render a document, resolving the physical layout and draw config first.
///
/// `draw_config` keys from the document override the supplied ones. The physical
/// layout comes from `layout_override` when given, otherwise from the document.
///
/// # Errors
///
/// Fails when no layout is available or the renderer reports an error.
pub fn draw_keymap(
    renderer: &dyn KeymapRenderer,
    document: &KeymapDocument,
    draw_config: &Value,
    layout_override: Option<&LayoutOverride>,
) -> Result<Rendered> {
    let layout = match layout_override {
        Some(layout) => layout.to_layout_value(),
        None => document.layout.clone().ok_or_else(|| {
            anyhow!("A physical layout needs to be specified either in the keymap or as a layout file")
        })?,
    };
    let config = merge_draw_config(draw_config, document.draw_config.as_ref())?;
    debug!(layers = document.layers.len(), "rendering keymap");
    renderer.render(document, &config, &layout)
}

fn merge_draw_config(base: &Value, overrides: Option<&Value>) -> Result<Value> {
    let mut merged = match base {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => bail!("draw config must be a mapping"),
    };
    match overrides {
        Some(Value::Object(map)) => {
            for (key, value) in map {
                merged.insert(key.clone(), value.clone());
            }
        }
        Some(Value::Null) | None => {}
        Some(_) => bail!("\"draw_config\" in the keymap must be a mapping"),
    }
    Ok(Value::Object(merged))
}

const DRAW_SCRIPT: &str = r#"
import io, json, sys
from keymap_drawer.config import DrawConfig
from keymap_drawer.draw import KeymapDrawer
from keymap_drawer.physical_layout import layout_factory
request = json.load(sys.stdin)
config = DrawConfig(**request["draw_config"])
keymap = request["keymap"]
out = io.StringIO()
drawer = KeymapDrawer(
    config=config,
    out=out,
    layers=keymap["layers"],
    layout=layout_factory(config=config, **request["layout"]),
    combos=keymap.get("combos", []),
)
drawer.print_board()
sys.stdout.write(out.getvalue())
"#;

/// Runs keymap-drawer's SVG drawer through a Python interpreter.
#[derive(Debug, Clone)]
pub struct PythonKeymapRenderer {
    python: String,
    timeout: Option<Duration>,
}

impl PythonKeymapRenderer {
    #[must_use]
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl KeymapRenderer for PythonKeymapRenderer {
    fn render(
        &self,
        document: &KeymapDocument,
        draw_config: &Value,
        layout: &Value,
    ) -> Result<Rendered> {
        let request = json!({
            "keymap": document,
            "draw_config": draw_config,
            "layout": layout,
        });
        let input = serde_json::to_vec(&request)?;
        let args = vec!["-c".to_string(), DRAW_SCRIPT.to_string()];
        let cwd = std::env::current_dir().context("failed to read current directory")?;
        let output = run_command_with_input(&self.python, &args, &cwd, Some(&input), self.timeout)?;
        if !output.success() {
            bail!("keymap renderer failed: {}", output.stderr.trim());
        }
        Ok(Rendered {
            svg: output.stdout,
            log: output.stderr,
        })
    }
}
