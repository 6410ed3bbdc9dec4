//! Scratch trees must disappear whichever way a run ends.
//!
//! Kept in its own binary: it points `TMPDIR` at a private directory.

mod common;

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use httptest::Server;
use kd_core::{
    KeymapParser, KeymapSource, ParseConfig, ParseOutcome, ParsedKeymap, Pipeline,
    PipelineError, SnapshotCache,
};

use common::{
    expect_branch, expect_zipball, forge, zipball, FakeParser, FakeWest, KEYMAP_URL, SHA_ZIPBALL,
};

#[derive(Default)]
struct FailingParser {
    paths: Mutex<Vec<PathBuf>>,
}

impl KeymapParser for FailingParser {
    fn parse(
        &self,
        source: &KeymapSource<'_>,
        _num_cols: u32,
        _config: &ParseConfig,
    ) -> anyhow::Result<ParsedKeymap> {
        self.paths.lock().unwrap().push(source.path.to_path_buf());
        anyhow::bail!("unexpected token at line 3")
    }
}

fn run_against(archive: Vec<u8>, parser: &dyn KeymapParser) -> Result<ParseOutcome, PipelineError> {
    let server = Server::run();
    expect_branch(&server, 1);
    expect_zipball(&server, SHA_ZIPBALL, archive, 1);
    let forge = forge(&server);
    let snapshots = SnapshotCache::new(Duration::from_secs(60), 4);
    let west = FakeWest::default();
    Pipeline::new("github.com", &forge, &snapshots, &west, parser).parse_keymap_url(
        KEYMAP_URL,
        &mut ParseConfig::default(),
        10,
        None,
    )
}

fn leftover_snapshots(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("kd-snapshot-"))
        .collect()
}

#[test]
fn scratch_tree_is_removed_on_every_exit() {
    let temp_root = tempfile::tempdir().unwrap();
    std::env::set_var("TMPDIR", temp_root.path());

    let err = run_against(
        zipball(&[("config/other.keymap", "")]),
        &FakeParser::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::MissingKeymap { .. }), "{err}");
    assert_eq!(leftover_snapshots(temp_root.path()), Vec::<String>::new());

    let failing = FailingParser::default();
    let err = run_against(
        zipball(&[
            ("config/kb.keymap", "/ { };"),
            ("config/west.yml", "manifest: {}\n"),
        ]),
        &failing,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Parser(_)), "{err}");
    let seen = failing.paths.lock().unwrap();
    assert!(
        seen[0].starts_with(temp_root.path()),
        "parser ran outside the scratch root: {}",
        seen[0].display()
    );
    assert!(!seen[0].exists());
    assert_eq!(leftover_snapshots(temp_root.path()), Vec::<String>::new());

    run_against(zipball(&[("config/kb.keymap", "/ { };")]), &FakeParser::default()).unwrap();
    assert_eq!(leftover_snapshots(temp_root.path()), Vec::<String>::new());
}
