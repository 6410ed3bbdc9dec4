//! West module bootstrapping for snapshots that declare a `config/west.yml` manifest.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::parser::ParseConfig;
use crate::process::{run_command, RunOutput};

/// Manifest location relative to the repository root.
pub const MANIFEST_PATH: &str = "config/west.yml";
/// Projects west must skip: firmware and RTOS bases are available to the parser already.
pub const PROJECT_FILTER: &str = " -zmk,-zephyr";
const UPDATE_FETCH_OPT: &str = "--fetch-opt=--filter=tree:0";

/// Seam over the `west` meta-tool.
pub trait WestRunner: Send + Sync {
    fn run(&self, args: &[String], cwd: &Path) -> anyhow::Result<RunOutput>;
}

/// Runs the `west` executable found on `PATH` (or at a configured location).
#[derive(Debug, Clone)]
pub struct SystemWest {
    program: String,
}

impl SystemWest {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl WestRunner for SystemWest {
    fn run(&self, args: &[String], cwd: &Path) -> anyhow::Result<RunOutput> {
        run_command(&self.program, args, cwd)
    }
}

/// What bootstrapping did; `diagnostics` feeds the user-facing log.
#[derive(Debug, Default, Clone)]
pub struct BootstrapReport {
    pub manifest_found: bool,
    pub includes_added: Vec<PathBuf>,
    pub diagnostics: Vec<String>,
}

/// Fetch the modules declared by the repository's west manifest, then register every
/// `include` directory in the tree with the parser configuration.
///
/// Module fetch problems never abort: they are reported as warnings and in
/// [`BootstrapReport::diagnostics`], and the scan for include folders still runs.
pub fn bootstrap_modules(
    root: &Path,
    config: &mut ParseConfig,
    west: &dyn WestRunner,
) -> BootstrapReport {
    let manifest = root.join(MANIFEST_PATH);
    let mut report = BootstrapReport::default();
    if !manifest.is_file() {
        return report;
    }
    report.manifest_found = true;
    info!("Found {MANIFEST_PATH}, fetching modules");

    let manifest_dir = manifest.parent().unwrap_or(root).display().to_string();
    let steps: [(&str, Vec<String>); 3] = [
        ("init", vec!["init".into(), "--local".into(), manifest_dir]),
        (
            "config",
            vec![
                "config".into(),
                "--local".into(),
                "manifest.project-filter".into(),
                PROJECT_FILTER.into(),
            ],
        ),
        ("update", vec!["update".into(), UPDATE_FETCH_OPT.into()]),
    ];
    for (step, args) in steps {
        match west.run(&args, root) {
            Ok(output) => {
                let stderr = output.stderr.trim_end();
                if step == "update" && !stderr.is_empty() {
                    report.diagnostics.push(stderr.to_string());
                } else if !output.success() {
                    warn!(step, code = output.code, "west step failed");
                    if !stderr.is_empty() {
                        report.diagnostics.push(stderr.to_string());
                    }
                }
            }
            Err(err) => {
                warn!(step, error = %err, "west unavailable, skipping module fetch");
                report
                    .diagnostics
                    .push(format!("west {step} failed, modules were not fetched: {err:#}"));
                break;
            }
        }
    }

    for include in find_include_dirs(root) {
        if config.add_include(&include) {
            let shown = include.strip_prefix(root).unwrap_or(&include);
            info!(
                "Found include folder at {}, adding it to zmk_additional_includes",
                shown.display()
            );
            report.includes_added.push(include);
        }
    }
    report
}

/// Every directory literally named `include` below `root`, in lexical walk order.
#[must_use]
pub fn find_include_dirs(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir() && entry.file_name() == "include")
        .map(walkdir::DirEntry::into_path)
        .collect()
}
