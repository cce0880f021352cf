//! Shared test utilities for integration tests
//!
//! Builds dump trees on disk and runs whole restores against an in-memory
//! server. Also serializes access to the environment for config tests.

use bson::{Bson, Document, Timestamp};
use bsonrestore::codec::write_documents;
use bsonrestore::connection::memory::Operation;
use bsonrestore::connection::MemoryConnection;
use bsonrestore::error::RestoreError;
use bsonrestore::restore::{RestoreOptions, RestoreReport, RestoreSession};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// A dump directory under a temporary root
pub struct DumpTree {
    dir: TempDir,
}

impl DumpTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write a data file of documents, creating parent directories
    pub fn data_file(&self, relative: &str, docs: &[Document]) -> &Self {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        write_documents(File::create(path).unwrap(), docs).unwrap();
        self
    }

    /// Write a raw text file (metadata sidecars, stray files)
    pub fn text_file(&self, relative: &str, text: &str) -> &Self {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
        self
    }

    pub fn options(&self) -> RestoreOptions {
        RestoreOptions::new(self.root())
    }

    pub fn options_at(&self, relative: &str) -> RestoreOptions {
        RestoreOptions::new(self.path(relative))
    }
}

/// Run a full restore session against `conn`
pub fn restore(
    conn: &mut MemoryConnection,
    options: RestoreOptions,
) -> Result<RestoreReport, RestoreError> {
    RestoreSession::new(conn, options)?.run()
}

/// An oplog entry at `secs:1`
pub fn oplog_entry(op: &str, ns: &str, secs: u32, object: Document) -> Document {
    let mut entry = Document::new();
    entry.insert("ts", Timestamp { time: secs, increment: 1 });
    entry.insert("h", Bson::Int64(i64::from(secs)));
    entry.insert("op", op);
    entry.insert("ns", ns);
    entry.insert("o", object);
    entry
}

/// Namespaces of inserts recorded in the journal, in order
pub fn inserted_namespaces(conn: &MemoryConnection) -> Vec<String> {
    conn.journal()
        .iter()
        .filter_map(|op| match op {
            Operation::Insert { ns, .. } => Some(ns.clone()),
            _ => None,
        })
        .collect()
}

/// Commands recorded in the journal with the given name
pub fn commands_named<'a>(conn: &'a MemoryConnection, name: &str) -> Vec<&'a Document> {
    conn.journal()
        .iter()
        .filter_map(|op| match op {
            Operation::Command { command, .. } if command.keys().next().map(String::as_str) == Some(name) => {
                Some(command)
            }
            _ => None,
        })
        .collect()
}

/// Run `f` with XDG_CONFIG_HOME pointed at `config_home` and every
/// BSONRESTORE__ variable cleared; the environment is restored afterwards.
pub fn with_isolated_env<F, R>(config_home: &Path, vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let saved: Vec<(String, String)> = std::env::vars()
        .filter(|(k, _)| k.starts_with("BSONRESTORE") || k == "XDG_CONFIG_HOME")
        .collect();
    for (key, _) in &saved {
        std::env::remove_var(key);
    }

    std::env::set_var("XDG_CONFIG_HOME", config_home);
    for (key, value) in vars {
        std::env::set_var(key, value);
    }

    let result = f();

    for (key, _) in vars {
        std::env::remove_var(key);
    }
    std::env::remove_var("XDG_CONFIG_HOME");
    for (key, value) in saved {
        std::env::set_var(key, value);
    }

    result
}

/// Log lines written while the buffer's subscriber is the thread default
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a plain-text subscriber capturing every event at info and above
pub fn capture_logs<F, R>(f: F) -> (R, String)
where
    F: FnOnce() -> R,
{
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .without_time()
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs.contents())
}
