use std::error::Error as StdError;
use std::io::{self, Read};
use std::path::Path;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use kd_core::{
    decode_permalink_param, draw_keymap, export_png, fetch_example_keymaps,
    keymap_from_permalink, permalink, Config, Effects, KeymapDocument, LayoutOverride,
    ParseConfig, ParserKind, PipelineError, SystemEffects,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

mod cli;

use cli::{
    CommandGroupCli, DrawArgs, ExamplesArgs, KdCli, ParseArgs, PermalinkCommand, PngArgs,
};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = KdCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let outcome = execute(&cli.command)?;
    let code = emit_output(&cli, &outcome)?;
    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("kd={level},kd_core={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

#[derive(Debug)]
struct Outcome {
    status: CommandStatus,
    message: String,
    details: Value,
    /// Printed to stdout in human mode.
    body: Option<String>,
}

impl Outcome {
    fn ok(message: impl Into<String>, details: Value, body: Option<String>) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
            body,
        }
    }

    fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
            body: None,
        }
    }

    fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
            body: None,
        }
    }
}

fn emit_output(cli: &KdCli, outcome: &Outcome) -> Result<i32> {
    let code = match outcome.status {
        CommandStatus::Ok => 0,
        CommandStatus::UserError => 1,
        CommandStatus::Failure => 2,
    };

    if cli.json {
        let payload = json!({
            "status": outcome.status,
            "message": outcome.message,
            "details": outcome.details,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    if let Some(body) = &outcome.body {
        print!("{body}");
    }
    if outcome.status == CommandStatus::Ok {
        if !outcome.message.is_empty() {
            eprintln!("{}", outcome.message);
        }
    } else {
        eprintln!("error: {}", outcome.message);
        let cause = outcome.details.get("error").and_then(Value::as_str);
        if let Some(cause) = cause.filter(|cause| *cause != outcome.message) {
            eprintln!("  caused by: {cause}");
        }
        if let Some(hint) = outcome.details.get("hint").and_then(Value::as_str) {
            eprintln!("Hint: {hint}");
        }
    }
    Ok(code)
}

fn execute(command: &CommandGroupCli) -> Result<Outcome> {
    match command {
        CommandGroupCli::Parse(args) => parse_command(args),
        CommandGroupCli::Draw(args) => draw_command(args),
        CommandGroupCli::Png(args) => png_command(args),
        CommandGroupCli::Permalink(command) => permalink_command(command),
        CommandGroupCli::Examples(args) => examples_command(args),
    }
}

fn system_effects() -> Result<SystemEffects> {
    let config = Config::from_env().map_err(|err| eyre!("{err:#}"))?;
    SystemEffects::new(&config).map_err(|err| eyre!("{err:#}"))
}

fn parse_command(args: &ParseArgs) -> Result<Outcome> {
    let effects = system_effects()?;
    let mut config = ParseConfig::default();
    for include in &args.includes {
        config.add_include(include);
    }

    let layout = args.layout.as_deref();
    let result = match (&args.file, &args.url) {
        (Some(file), _) => {
            let Some(kind) = args.kind.or_else(|| ParserKind::for_path(file)) else {
                return Ok(Outcome::user_error(
                    format!("Cannot tell which parser reads '{}'", file.display()),
                    json!({"hint": "Pass --kind zmk, --kind qmk or --kind kanata."}),
                ));
            };
            effects
                .pipeline()
                .parse_keymap_file(file, kind, &config, args.columns, layout)
        }
        (None, Some(url)) => {
            effects
                .pipeline()
                .parse_keymap_url(url, &mut config, args.columns, layout)
        }
        (None, None) => {
            return Ok(Outcome::user_error(
                "Provide a keymap URL or --file",
                json!({}),
            ))
        }
    };
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => return Ok(pipeline_failure(&err)),
    };

    if !outcome.log.trim().is_empty() {
        for line in outcome.log.lines() {
            info!("{line}");
        }
    }
    let layout = outcome.layout.as_ref().map(|handle| {
        json!({
            "path": handle.source_path.display().to_string(),
            "format": handle.format().option_key(),
        })
    });
    if let (Some(path), Some(handle)) = (&args.save_layout, &outcome.layout) {
        fs_err::write(path, &handle.content)?;
    }

    let body = match &args.output {
        Some(path) => {
            fs_err::write(path, &outcome.document)?;
            None
        }
        None => Some(outcome.document.clone()),
    };
    let message = match &outcome.layout {
        Some(handle) => format!(
            "parsed keymap, physical layout found at {}",
            handle.source_path.display()
        ),
        None => "parsed keymap".to_string(),
    };
    Ok(Outcome::ok(
        message,
        json!({
            "document": outcome.document,
            "log": outcome.log,
            "layout": layout,
        }),
        body,
    ))
}

fn pipeline_failure(err: &PipelineError) -> Outcome {
    let details = json!({
        "error": error_chain(err),
        "hint": err.hint(),
    });
    match err {
        PipelineError::InvalidUrl(_)
        | PipelineError::Fetch(_)
        | PipelineError::MissingKeymap { .. }
        | PipelineError::ReadKeymap { .. }
        | PipelineError::InvalidLayoutOverride(_) => {
            Outcome::user_error(err.user_message(), details)
        }
        _ => Outcome::failure(err.user_message(), details),
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

fn draw_command(args: &DrawArgs) -> Result<Outcome> {
    let text = fs_err::read_to_string(&args.keymap)?;
    let document = match KeymapDocument::from_normalized(&text) {
        Ok(document) => document,
        Err(err) => {
            return Ok(Outcome::user_error(
                "Error while reading keymap",
                json!({"error": format!("{err:#}")}),
            ))
        }
    };
    let draw_config: Value = match &args.draw_config {
        Some(path) => match serde_yaml::from_str(&fs_err::read_to_string(path)?) {
            Ok(config) => config,
            Err(err) => {
                return Ok(Outcome::user_error(
                    "Error while reading draw config",
                    json!({"error": err.to_string()}),
                ))
            }
        },
        None => json!({}),
    };
    let layout = match &args.layout_file {
        Some(path) => Some(LayoutOverride::from_file(
            &file_name(path),
            fs_err::read(path)?,
        )),
        None => None,
    };

    let effects = system_effects()?;
    let rendered = match draw_keymap(effects.renderer(), &document, &draw_config, layout.as_ref())
    {
        Ok(rendered) => rendered,
        Err(err) => {
            return Ok(Outcome::failure(
                "Error while drawing SVG",
                json!({"error": format!("{err:#}")}),
            ))
        }
    };
    let body = match &args.output {
        Some(path) => {
            fs_err::write(path, &rendered.svg)?;
            None
        }
        None => Some(rendered.svg.clone()),
    };
    Ok(Outcome::ok(
        "",
        json!({"svg": rendered.svg, "log": rendered.log}),
        body,
    ))
}

fn png_command(args: &PngArgs) -> Result<Outcome> {
    let svg = fs_err::read_to_string(&args.svg)?;
    let effects = system_effects()?;
    match export_png(effects.rasterizer(), &svg, &args.background, args.scale) {
        Ok(png) => {
            fs_err::write(&args.output, &png)?;
            Ok(Outcome::ok(
                format!("wrote {}", args.output.display()),
                json!({"path": args.output.display().to_string(), "bytes": png.len()}),
                None,
            ))
        }
        Err(err) => Ok(Outcome::failure(
            "Error while exporting PNG",
            json!({"error": format!("{err:#}")}),
        )),
    }
}

fn permalink_command(command: &PermalinkCommand) -> Result<Outcome> {
    match command {
        PermalinkCommand::Encode { keymap } => {
            let document = read_input(keymap)?;
            let link = permalink(&document)?;
            Ok(Outcome::ok("", json!({"permalink": link}), Some(format!("{link}\n"))))
        }
        PermalinkCommand::Decode { link } => {
            let decoded = if link.starts_with("http://") || link.starts_with("https://") {
                keymap_from_permalink(link)
            } else {
                decode_permalink_param(link)
            };
            match decoded {
                Ok(document) => Ok(Outcome::ok(
                    "",
                    json!({"document": document}),
                    Some(document.clone()),
                )),
                Err(err) => Ok(Outcome::user_error(
                    "Could not decode permalink",
                    json!({"error": error_chain(&err)}),
                )),
            }
        }
    }
}

fn examples_command(args: &ExamplesArgs) -> Result<Outcome> {
    let effects = system_effects()?;
    let examples = match fetch_example_keymaps(effects.forge(), effects.snapshots()) {
        Ok(examples) => examples,
        Err(err) => {
            return Ok(Outcome::failure(
                "Could not fetch example keymaps",
                json!({"error": format!("{err:#}")}),
            ))
        }
    };
    match &args.name {
        Some(name) => match examples.get(name) {
            Some(contents) => Ok(Outcome::ok(
                "",
                json!({"name": name, "contents": contents}),
                Some(contents.clone()),
            )),
            None => Ok(Outcome::user_error(
                format!("no example named {name}"),
                json!({"available": examples.keys().collect::<Vec<_>>()}),
            )),
        },
        None => {
            let names: Vec<&String> = examples.keys().collect();
            let listing = names
                .iter()
                .map(|name| format!("{name}\n"))
                .collect::<String>();
            Ok(Outcome::ok("", json!({"examples": names}), Some(listing)))
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(fs_err::read_to_string(path)?)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}
