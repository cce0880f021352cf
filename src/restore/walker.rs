//! Dump tree walker and namespace resolver

use super::RestoreSession;
use crate::error::RestoreError;
use crate::restore::metadata::{load_metadata, metadata_path, CollectionMetadata};
use crate::types::{
    Namespace, NamespaceContext, RestoreScope, DEFAULT_DATABASE, INDEX_FILE, METADATA_SUFFIX,
    OPLOG_FILE, PROFILE_FILE,
};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// A node of the dump tree, classified by position and suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpEntry {
    Directory(PathBuf),
    /// A collection dump (`.bson` or `.bin`)
    DataFile(PathBuf),
    /// A sidecar metadata file, read together with its data file
    Metadata(PathBuf),
    /// The legacy per-directory index definition file
    IndexFile(PathBuf),
    /// Anything else
    Unknown(PathBuf),
}

impl DumpEntry {
    pub fn classify(path: PathBuf, is_dir: bool) -> Self {
        if is_dir {
            return DumpEntry::Directory(path);
        }
        let name = file_name(&path);
        if name == INDEX_FILE {
            DumpEntry::IndexFile(path)
        } else if name.ends_with(METADATA_SUFFIX) {
            DumpEntry::Metadata(path)
        } else if name.ends_with(".bson") || name.ends_with(".bin") {
            DumpEntry::DataFile(path)
        } else {
            DumpEntry::Unknown(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            DumpEntry::Directory(p)
            | DumpEntry::DataFile(p)
            | DumpEntry::Metadata(p)
            | DumpEntry::IndexFile(p)
            | DumpEntry::Unknown(p) => p,
        }
    }
}

/// Per-directory scan state
struct DirFrame {
    deferred: Vec<PathBuf>,
    saw_metadata: bool,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_hidden(path: &Path) -> bool {
    file_name(path).starts_with('.')
}

/// File name with its last extension removed
fn collection_stem(path: &Path) -> String {
    let name = file_name(path);
    match name.rfind('.') {
        Some(dot) => name[..dot].to_string(),
        None => name,
    }
}

/// Target namespace for a data file under `scope`
pub fn resolve_namespace(scope: &RestoreScope, path: &Path) -> Namespace {
    let db = match scope.database() {
        Some(db) => db.to_string(),
        None => path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
    };
    let collection = match scope.collection() {
        Some(collection) => collection.to_string(),
        None => collection_stem(path),
    };
    Namespace::new(db, collection)
}

/// Visible entries of `dir`, in the order the file system returns them
fn list_entries(dir: &Path) -> Result<Vec<DumpEntry>, RestoreError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            RestoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to read directory {}: {}", dir.display(), e),
            ))
        })?;
        let path = entry.path().to_path_buf();
        if is_hidden(&path) {
            continue;
        }
        let is_dir = path.is_dir();
        entries.push(DumpEntry::classify(path, is_dir));
    }
    Ok(entries)
}

impl RestoreSession<'_> {
    /// Restore everything under `root` (a directory tree or a single file)
    pub fn walk(&mut self, root: &Path) -> Result<(), RestoreError> {
        self.drill_down(root, true)?;
        self.log_summary();
        Ok(())
    }

    fn drill_down(&mut self, path: &Path, top_level: bool) -> Result<(), RestoreError> {
        debug!(path = %path.display(), "drillDown");

        if !top_level && is_hidden(path) {
            return Ok(());
        }

        if path.is_dir() {
            self.visit_directory(path, top_level)
        } else {
            self.restore_file(path)
        }
    }

    fn visit_directory(&mut self, dir: &Path, top_level: bool) -> Result<(), RestoreError> {
        let entries = list_entries(dir)?;
        self.check_shape(dir, &entries)?;

        let mut frame = DirFrame {
            deferred: Vec::new(),
            saw_metadata: false,
        };

        for entry in entries {
            match entry {
                DumpEntry::Metadata(_) => frame.saw_metadata = true,
                DumpEntry::IndexFile(path) => frame.deferred.push(path),
                DumpEntry::DataFile(ref path)
                    if top_level
                        && self.options.scope.is_full()
                        && file_name(path) == OPLOG_FILE => {}
                other => self.drill_down(other.path(), false)?,
            }
        }

        if frame.saw_metadata {
            for path in &frame.deferred {
                info!(path = %path.display(), "Skipping legacy index file; metadata files carry the index definitions");
            }
            return Ok(());
        }
        for path in frame.deferred {
            self.restore_file(&path)?;
        }
        Ok(())
    }

    /// Enforce the directory shape the scope requires, before any entry is processed
    fn check_shape(&self, dir: &Path, entries: &[DumpEntry]) -> Result<(), RestoreError> {
        let has_subdirectory = entries
            .iter()
            .any(|e| matches!(e, DumpEntry::Directory(_)));

        match &self.options.scope {
            RestoreScope::Full => Ok(()),
            RestoreScope::SingleDatabase(_) if has_subdirectory => {
                Err(RestoreError::ScopeViolation {
                    expected: "database",
                    flag: "db",
                    path: dir.to_path_buf(),
                })
            }
            RestoreScope::SingleDatabase(_) => Ok(()),
            RestoreScope::SingleCollection { .. } => {
                let restorable = entries
                    .iter()
                    .filter(|e| !matches!(e, DumpEntry::Metadata(_)))
                    .count();
                if has_subdirectory || restorable != 1 {
                    Err(RestoreError::ScopeViolation {
                        expected: "collection",
                        flag: "collection",
                        path: dir.to_path_buf(),
                    })
                } else {
                    Ok(())
                }
            }
        }
    }

    fn restore_file(&mut self, path: &Path) -> Result<(), RestoreError> {
        match DumpEntry::classify(path.to_path_buf(), false) {
            DumpEntry::Metadata(_) => return Ok(()),
            DumpEntry::Unknown(_) => {
                error!(path = %path.display(), "don't know what to do with file");
                return Ok(());
            }
            _ => {}
        }

        info!(path = %path.display(), "Restoring file");

        if file_name(path) == PROFILE_FILE {
            info!(path = %path.display(), "skipping {}", PROFILE_FILE);
            return Ok(());
        }

        let ns = resolve_namespace(&self.options.scope, path);

        if self.replay.has_window() {
            return Err(RestoreError::OplogLimitWithCollections(path.to_path_buf()));
        }

        info!(ns = %ns, "going into namespace");

        let index_file = ns.is_index_collection();

        if self.options.drop && !index_file {
            if ns.is_users() {
                self.snapshot_users(&ns)?;
            } else {
                info!(ns = %ns, "dropping");
                if let Err(e) = self.conn.drop_collection(&ns) {
                    warn!(ns = %ns, error = %e, "Failed to drop collection");
                }
            }
        }

        let metadata = if self.options.restore_options || self.options.restore_indexes {
            self.collection_metadata(path)?
        } else {
            None
        };

        self.context = Some(NamespaceContext::Collection(ns.clone()));

        if !self.options.drop && !index_file && self.conn.find_collection(&ns)?.is_some() {
            warn!(
                ns = %ns,
                "Restoring to {} without dropping. Restored data will be inserted without raising errors; check your server log",
                ns
            );
        }

        if self.options.restore_options {
            if let Some(declared) = metadata.as_ref().and_then(|m| m.options.as_ref()) {
                self.create_collection_with_options(&ns, declared)?;
            }
        }

        let stats = self.restore_stream(path)?;
        info!(ns = %ns, documents = stats.documents, "Finished file");

        if self.options.drop && ns.is_users() {
            self.purge_stale_users(&ns);
        }

        if self.options.restore_indexes {
            if let Some(metadata) = metadata {
                for definition in metadata.indexes {
                    self.build_index(definition, false)?;
                }
            }
        }

        self.report.files_restored += 1;
        Ok(())
    }

    /// Sidecar metadata for a data file; `None` when the sidecar is absent
    fn collection_metadata(
        &mut self,
        data_file: &Path,
    ) -> Result<Option<CollectionMetadata>, RestoreError> {
        let stem = collection_stem(data_file);
        let path = metadata_path(data_file);
        if !path.exists() {
            if !stem.starts_with("system.") {
                warn!(path = %path.display(), "{} not found. Skipping.", path.display());
            }
            return Ok(None);
        }
        load_metadata(&path)
            .map(Some)
            .map_err(|source| RestoreError::Metadata { path, source })
    }
}
