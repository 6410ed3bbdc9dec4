#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use httptest::{matchers::*, responders::*, Expectation, Server};
use kd_core::{
    ForgeConfig, GithubApi, KeymapDocument, KeymapParser, KeymapSource, ParseConfig,
    ParsedKeymap, ParserKind, RunOutput, WestRunner,
};
use serde_json::json;
use url::Url;
use zip::write::FileOptions;
use zip::ZipWriter;

pub const SHA: &str = "0123456789abcdef0123456789abcdef01234567";
pub const KEYMAP_URL: &str = "https://github.com/acme/zmk-config/blob/main/config/kb.keymap";
pub const SHA_ZIPBALL: &str =
    "/repos/acme/zmk-config/zipball/0123456789abcdef0123456789abcdef01234567";

pub fn zipball(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();
    writer.add_directory("acme-zmk-config-0123456/", options).unwrap();
    for (name, contents) in entries {
        let name = format!("acme-zmk-config-0123456/{name}");
        if name.ends_with('/') {
            writer.add_directory(name, options).unwrap();
        } else {
            writer.start_file(name, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

pub fn expect_branch(server: &Server, times: usize) {
    expect_branch_at(server, "/repos/acme/zmk-config/git/ref/heads/main", times);
}

pub fn expect_branch_at(server: &Server, path: &'static str, times: usize) {
    server.expect(
        Expectation::matching(request::method_path("GET", path))
            .times(times)
            .respond_with(json_encoded(json!({"object": {"sha": SHA}}))),
    );
}

pub fn expect_zipball(server: &Server, path: &'static str, archive: Vec<u8>, times: usize) {
    server.expect(
        Expectation::matching(request::method_path("GET", path))
            .times(times)
            .respond_with(status_code(200).body(archive)),
    );
}

pub fn forge(server: &Server) -> GithubApi {
    let base = Url::parse(&server.url_str("/")).unwrap();
    GithubApi::new(&ForgeConfig::new("github.com", base)).unwrap()
}

#[derive(Default)]
pub struct FakeWest {
    pub calls: Mutex<Vec<String>>,
}

impl WestRunner for FakeWest {
    fn run(&self, args: &[String], cwd: &Path) -> anyhow::Result<RunOutput> {
        self.calls.lock().unwrap().push(args[0].clone());
        let mut stderr = String::new();
        if args[0] == "update" {
            std::fs::create_dir_all(cwd.join("modules/helpers/include"))?;
            stderr.push_str("fetching helpers\n");
        }
        Ok(RunOutput {
            code: 0,
            stdout: String::new(),
            stderr,
        })
    }
}

/// Records what it was handed and answers with a two-layer document.
#[derive(Default)]
pub struct FakeParser {
    pub seen: Mutex<Vec<(String, Vec<PathBuf>)>>,
    pub kinds: Mutex<Vec<ParserKind>>,
    pub log: &'static str,
}

impl KeymapParser for FakeParser {
    fn parse(
        &self,
        source: &KeymapSource<'_>,
        num_cols: u32,
        config: &ParseConfig,
    ) -> anyhow::Result<ParsedKeymap> {
        assert!(source.path.is_file());
        self.seen.lock().unwrap().push((
            source.text.to_string(),
            config.zmk_additional_includes.clone(),
        ));
        self.kinds.lock().unwrap().push(source.kind);
        let mut layers = indexmap::IndexMap::new();
        layers.insert("base".to_string(), json!([["Q"]]));
        layers.insert("cols".to_string(), json!([num_cols]));
        Ok(ParsedKeymap {
            document: KeymapDocument {
                layers,
                ..KeymapDocument::default()
            },
            log: self.log.to_string(),
        })
    }
}
