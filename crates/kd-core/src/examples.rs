//! Example keymaps bundled with the keymap-drawer repository.

use std::io::{Cursor, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use tracing::debug;
use zip::ZipArchive;

use crate::forge::{resolve_commit, ForgeApi, RepoCoordinate};
use crate::snapshot::SnapshotCache;

pub const EXAMPLES_OWNER: &str = "caksoylar";
pub const EXAMPLES_REPO: &str = "keymap-drawer";
pub const EXAMPLES_REF: &str = "dev";

/// File name → contents of every `*/examples/*.yaml` in the snapshot, ordered by path.
///
/// # Errors
///
/// Fails when the snapshot cannot be fetched or read, or holds no examples.
pub fn fetch_example_keymaps(
    forge: &dyn ForgeApi,
    snapshots: &SnapshotCache,
) -> Result<IndexMap<String, String>> {
    let coordinate = RepoCoordinate {
        owner: EXAMPLES_OWNER.to_string(),
        repo: EXAMPLES_REPO.to_string(),
        reference: EXAMPLES_REF.to_string(),
    };
    let commit = resolve_commit(forge, &coordinate)?;
    let archive = snapshots.fetch_archive(forge, EXAMPLES_OWNER, EXAMPLES_REPO, &commit)?;
    example_keymaps_from_archive(&archive)
}

/// Read the example keymaps straight out of a zip archive, without extracting it.
///
/// # Errors
///
/// Fails on unreadable archives, non-UTF-8 examples, or when none are present.
pub fn example_keymaps_from_archive(archive: &[u8]) -> Result<IndexMap<String, String>> {
    let mut zip = ZipArchive::new(Cursor::new(archive)).context("snapshot is not a zip archive")?;
    let mut paths: Vec<String> = zip
        .file_names()
        .filter(|name| is_example_path(name))
        .map(str::to_owned)
        .collect();
    if paths.is_empty() {
        bail!("Retrieving examples failed, no example keymaps found");
    }
    paths.sort();

    let mut examples = IndexMap::with_capacity(paths.len());
    for path in paths {
        let mut contents = String::new();
        zip.by_name(&path)?
            .read_to_string(&mut contents)
            .with_context(|| format!("example {path} is not valid UTF-8"))?;
        let name = Path::new(&path)
            .file_name()
            .map_or_else(|| path.clone(), |name| name.to_string_lossy().into_owned());
        examples.insert(name, contents);
    }
    debug!(count = examples.len(), "loaded example keymaps");
    Ok(examples)
}

fn is_example_path(path: &str) -> bool {
    path.ends_with(".yaml") && path.contains("/examples/")
}
