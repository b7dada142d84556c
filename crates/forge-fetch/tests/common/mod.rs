//! Shared helpers for the integration tests

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use forge_fetch::store::{EntryMode, TreeBuilder};
use forge_fetch::{
    DiskTreeStore, FetchSettings, Fetcher, ForgeRegistry, GitHash, HttpHeader, JsonFactCache,
    Transport, TransportError,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

pub const REV: &str = "0123456789abcdef0123456789abcdef01234567";
pub const MTIME: u64 = 1_700_000_000;

/// In-memory transport: serves registered bodies, 404 for everything else
#[derive(Default)]
pub struct MockTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<(String, Vec<HttpHeader>)>>,
}

impl MockTransport {
    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.bodies.lock().insert(url.to_string(), body.into());
    }

    pub fn requests(&self) -> Vec<(String, Vec<HttpHeader>)> {
        self.requests.lock().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Transport for MockTransport {
    fn fetch(
        &self,
        url: &str,
        headers: &[HttpHeader],
    ) -> Result<Box<dyn Read + Send>, TransportError> {
        self.requests.lock().push((url.to_string(), headers.to_vec()));
        match self.bodies.lock().get(url) {
            Some(body) => Ok(Box::new(Cursor::new(body.clone()))),
            None => Err(TransportError::HttpStatus {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

/// A fetcher over a temporary store and fact cache
pub struct Harness {
    pub temp: TempDir,
    pub transport: Arc<MockTransport>,
    pub store: Arc<DiskTreeStore>,
    pub facts: Arc<JsonFactCache>,
    pub fetcher: Fetcher,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(FetchSettings::default())
    }

    pub fn with_settings(settings: FetchSettings) -> Self {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::default());
        let store = Arc::new(DiskTreeStore::open(temp.path().join("trees")).unwrap());
        let facts = Arc::new(JsonFactCache::open(temp.path().join("facts.json")).unwrap());
        let fetcher = Fetcher::new(
            ForgeRegistry::builtin(),
            settings,
            transport.clone(),
            store.clone(),
            facts.clone(),
        );
        Self {
            temp,
            transport,
            store,
            facts,
            fetcher,
        }
    }
}

/// Files of the sample repository: path, content, executable
pub fn sample_files() -> Vec<(&'static str, &'static [u8], bool)> {
    vec![
        ("README.md", &b"# sample\n"[..], false),
        ("src/lib.rs", &b"pub fn answer() -> u32 { 42 }\n"[..], false),
        ("scripts/build.sh", &b"#!/bin/sh\nexit 0\n"[..], true),
    ]
}

/// Gzip'd tarball with everything under `<top>/`, the way forges serve them
pub fn tarball(top: &str, files: &[(&str, &[u8], bool)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    let mut dir = tar::Header::new_gnu();
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_mode(0o755);
    dir.set_size(0);
    dir.set_mtime(MTIME - 100);
    builder
        .append_data(&mut dir, format!("{top}/"), io::empty())
        .unwrap();

    for (path, content, executable) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(if *executable { 0o755 } else { 0o644 });
        header.set_size(content.len() as u64);
        header.set_mtime(MTIME);
        builder
            .append_data(&mut header, format!("{top}/{path}"), *content)
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// The Git tree hash of `files`
pub fn tree_hash_of(files: &[(&str, &[u8], bool)]) -> GitHash {
    let mut tree = TreeBuilder::new();
    for (path, content, executable) in files {
        let components: Vec<String> = path.split('/').map(String::from).collect();
        let mode = if *executable {
            EntryMode::Executable
        } else {
            EntryMode::File
        };
        tree.insert_blob(&components, mode, GitHash::of_object("blob", content))
            .unwrap();
    }
    tree.hash()
}

/// GitHub commit API response
pub fn github_commit_json(rev: &str, tree: &str) -> String {
    format!(r#"{{"sha":"{rev}","node_id":"x","commit":{{"message":"m","tree":{{"sha":"{tree}","url":"u"}}}}}}"#)
}

/// Log output captured from a scoped subscriber
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Run `f` with every log event at debug level or above recorded here
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
