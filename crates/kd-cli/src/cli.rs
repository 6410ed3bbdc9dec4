use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use kd_core::ParserKind;

pub const KD_BEFORE_HELP: &str = concat!(
    "kd ",
    env!("CARGO_PKG_VERSION"),
    ": keymap-drawer from a repository URL\n\n",
    "  parse            Parse a ZMK keymap from a GitHub blob URL, or a local keymap file.\n",
    "  draw             Render a parsed keymap to SVG.\n",
    "  png              Rasterize a rendered SVG.\n",
    "  permalink        Encode or decode shareable keymap links.\n",
    "  examples         List or print the bundled example keymaps.\n",
);

#[derive(Parser, Debug)]
#[command(author, version, disable_help_subcommand = true, before_help = KD_BEFORE_HELP)]
pub struct KdCli {
    #[arg(short, long, action = ArgAction::Count, global = true, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[arg(long, global = true, help = "Force trace logging regardless of -v")]
    pub trace: bool,
    #[arg(long, global = true, help = "Emit {status,message,details} JSON envelopes")]
    pub json: bool,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    /// Parse a keymap from a repository URL or a local file into keymap YAML.
    Parse(ParseArgs),
    /// Render a parsed keymap to SVG.
    Draw(DrawArgs),
    /// Convert an SVG produced by `draw` into PNG.
    Png(PngArgs),
    /// Encode or decode shareable keymap links.
    #[command(subcommand)]
    Permalink(PermalinkCommand),
    /// List the example keymaps, or print one of them.
    Examples(ExamplesArgs),
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// GitHub blob URL of a .keymap file.
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub url: Option<String>,
    #[arg(long, value_name = "PATH", help = "Parse a local keymap file instead of a URL")]
    pub file: Option<PathBuf>,
    #[arg(long, value_name = "zmk|qmk|kanata", requires = "file", help = "Parser for --file (guessed from the extension by default)")]
    pub kind: Option<ParserKind>,
    #[arg(long, short = 'c', default_value_t = 10, help = "Columns per row in the parsed layers")]
    pub columns: u32,
    #[arg(long, value_name = "YAML", help = "Layout to put in the output, e.g. '{qmk_keyboard: corne_rotated}'")]
    pub layout: Option<String>,
    #[arg(long = "include", value_name = "DIR", help = "Extra include directory for the parser (repeatable)")]
    pub includes: Vec<PathBuf>,
    #[arg(long, short, value_name = "FILE", help = "Write the keymap here instead of stdout")]
    pub output: Option<PathBuf>,
    #[arg(long, value_name = "FILE", help = "Save a discovered physical layout to FILE")]
    pub save_layout: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DrawArgs {
    /// Keymap produced by `parse`.
    pub keymap: PathBuf,
    #[arg(long, value_name = "FILE", help = "Physical layout file (.json or .dtsi) overriding the keymap's layout")]
    pub layout_file: Option<PathBuf>,
    #[arg(long, value_name = "FILE", help = "Draw config as a YAML (or JSON) mapping")]
    pub draw_config: Option<PathBuf>,
    #[arg(long, short, value_name = "FILE", help = "Write the SVG here instead of stdout")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PngArgs {
    /// SVG produced by `draw`.
    pub svg: PathBuf,
    #[arg(long, default_value = "white")]
    pub background: String,
    #[arg(long, default_value_t = 1.0)]
    pub scale: f64,
    #[arg(long, short, value_name = "FILE")]
    pub output: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum PermalinkCommand {
    /// Print a permalink for a keymap file (`-` reads stdin).
    Encode {
        #[arg(default_value = "-")]
        keymap: PathBuf,
    },
    /// Print the keymap held by a permalink or by its bare `keymap_yaml` value.
    Decode { link: String },
}

#[derive(Args, Debug)]
pub struct ExamplesArgs {
    #[arg(long, help = "Print the example with this file name")]
    pub name: Option<String>,
}
