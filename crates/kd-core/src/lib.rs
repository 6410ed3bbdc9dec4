#![deny(clippy::all)]

pub mod archive;
pub mod config;
pub mod effects;
pub mod examples;
pub mod forge;
pub mod layout;
pub mod modules;
pub mod parser;
pub mod permalink;
pub mod pipeline;
pub mod process;
pub mod raster;
pub mod render;
pub mod snapshot;

pub use crate::archive::{extract_snapshot, ArchiveError, ExtractedTree};
pub use crate::config::{CacheConfig, Config, ForgeConfig, ToolsConfig};
pub use crate::effects::{Effects, SystemEffects};
pub use crate::examples::fetch_example_keymaps;
pub use crate::forge::{
    parse_keymap_url, resolve_commit, CommitId, ForgeApi, ForgeError, GithubApi, KeymapLocation,
    RepoCoordinate, UrlIssue,
};
pub use crate::layout::{discover_layout, LayoutFormat, LayoutHandle, LayoutOverride};
pub use crate::modules::{bootstrap_modules, BootstrapReport, SystemWest, WestRunner};
pub use crate::parser::{
    normalize_document, KeymapDocument, KeymapParser, KeymapSource, ParseConfig, ParsedKeymap,
    ParserKind, UnknownParserKind, LAYOUT_PREAMBLE,
};
pub use crate::permalink::{decode_permalink_param, keymap_from_permalink, permalink, PermalinkError};
pub use crate::pipeline::{ParseOutcome, Pipeline, PipelineError};
pub use crate::process::RunOutput;
pub use crate::raster::{export_png, sanitize_svg, Rasterizer, RsvgRasterizer};
pub use crate::render::{draw_keymap, KeymapRenderer, Rendered};
pub use crate::snapshot::{global_snapshot_cache, SnapshotCache, SnapshotKey};
