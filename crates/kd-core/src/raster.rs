//! PNG export of rendered SVGs.

use std::ops::Range;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::process::run_command_bytes;

const LABEL_STYLE: &str = "text.label, text.footer { stroke: none; }";
const FALLBACK_FONT: &str = "DejaVu Sans Mono,";

fn relative_font_size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"\s+style=(?:"[^"]*font-size: \d+(?:\.\d+)?%[^"]*"|'[^']*font-size: \d+(?:\.\d+)?%[^']*')"#,
        )
        .expect("font-size regex must compile")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<(/?)([A-Za-z][\w:.-]*)(?:[^>]*?)(/?)>").expect("tag regex must compile")
    })
}

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?a(?:\s[^>]*)?>").expect("anchor regex must compile"))
}

/// Adjust a keymap SVG for rasterizers with weaker CSS support.
///
/// Layer headers and the footer lose their outline, the monospace fallback font is
/// forced, percentage font sizes are dropped, and links in the footer are unwrapped.
#[must_use]
pub fn sanitize_svg(svg: &str) -> String {
    let styled = svg
        .replace("</style>", &format!("{LABEL_STYLE}</style>"))
        .replace("font-family: ", &format!("font-family: {FALLBACK_FONT}"));
    let sized = relative_font_size_re().replace_all(&styled, "").into_owned();
    match last_top_level_text(&sized) {
        Some(span) => {
            let footer = anchor_re().replace_all(&sized[span.clone()], "");
            format!("{}{}{}", &sized[..span.start], footer, &sized[span.end..])
        }
        None => sized,
    }
}

/// Byte span of the last `<text>` element that is a direct child of the root element.
fn last_top_level_text(svg: &str) -> Option<Range<usize>> {
    let mut depth = 0usize;
    let mut open: Option<usize> = None;
    let mut last = None;
    for caps in tag_re().captures_iter(svg) {
        let whole = caps.get(0)?;
        let closing = !caps[1].is_empty();
        let self_closing = !caps[3].is_empty();
        let is_text = &caps[2] == "text";
        if closing {
            depth = depth.saturating_sub(1);
            if is_text && depth == 1 {
                if let Some(start) = open.take() {
                    last = Some(start..whole.end());
                }
            }
        } else if self_closing {
            if is_text && depth == 1 {
                last = Some(whole.range());
            }
        } else {
            if is_text && depth == 1 {
                open = Some(whole.start());
            }
            depth += 1;
        }
    }
    last
}

pub trait Rasterizer: Send + Sync {
    /// Turn an SVG document into PNG bytes.
    fn rasterize(&self, svg: &str, background: &str, scale: f64) -> Result<Vec<u8>>;
}

/// Pipes SVG through `rsvg-convert`.
#[derive(Debug, Clone)]
pub struct RsvgRasterizer {
    program: String,
}

impl RsvgRasterizer {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Rasterizer for RsvgRasterizer {
    fn rasterize(&self, svg: &str, background: &str, scale: f64) -> Result<Vec<u8>> {
        let args = vec![
            "--background-color".to_string(),
            background.to_string(),
            "--zoom".to_string(),
            scale.to_string(),
            "--format".to_string(),
            "png".to_string(),
        ];
        let cwd = std::env::current_dir().context("failed to read current directory")?;
        let (code, png, stderr) =
            run_command_bytes(&self.program, &args, &cwd, Some(svg.as_bytes()), None)?;
        if code != 0 {
            bail!("{} exited with {code}: {}", self.program, stderr.trim());
        }
        Ok(png)
    }
}

/// Sanitize `svg` and rasterize it.
///
/// # Errors
///
/// Rejects non-positive scales and propagates rasterizer failures.
pub fn export_png(
    rasterizer: &dyn Rasterizer,
    svg: &str,
    background: &str,
    scale: f64,
) -> Result<Vec<u8>> {
    if !(scale.is_finite() && scale > 0.0) {
        bail!("scale must be a positive number (got {scale})");
    }
    rasterizer.rasterize(&sanitize_svg(svg), background, scale)
}
