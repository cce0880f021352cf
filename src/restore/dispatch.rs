//! Per-document dispatch
//!
//! Every decoded document is routed by the active [`NamespaceContext`]:
//! oplog entries go to the replay applier, index definitions to the index
//! builder, known users under drop mode are replaced in place, and everything
//! else is inserted.

use super::RestoreSession;
use crate::codec::DocumentStream;
use crate::error::RestoreError;
use crate::types::{Namespace, NamespaceContext};
use bson::{doc, Document};
use std::path::Path;
use tracing::{debug, error};

/// Documents read from one data file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub documents: u64,
}

impl RestoreSession<'_> {
    /// Decode `path` and dispatch each document in file order
    pub(crate) fn restore_stream(&mut self, path: &Path) -> Result<StreamStats, RestoreError> {
        let codec_error = |source| RestoreError::Codec {
            path: path.to_path_buf(),
            source,
        };

        let stream = DocumentStream::open(path).map_err(codec_error)?;
        let mut stats = StreamStats::default();
        for doc in stream {
            self.dispatch(doc.map_err(codec_error)?)?;
            stats.documents += 1;
        }
        Ok(stats)
    }

    /// Route one document by the active context
    pub fn dispatch(&mut self, doc: Document) -> Result<(), RestoreError> {
        let ns = match &self.context {
            None => return Err(RestoreError::NoActiveNamespace),
            Some(NamespaceContext::OplogReplay) => {
                self.apply_oplog_entry(doc);
                return Ok(());
            }
            Some(NamespaceContext::Collection(ns)) => ns.clone(),
        };

        if ns.is_index_collection() {
            return self.build_index(doc, true);
        }

        if let Some(filter) = &self.document_filter {
            if !filter.matches(&doc) {
                self.report.documents_filtered += 1;
                return Ok(());
            }
        }

        if self.options.drop && ns.is_users() {
            if let Some(user) = doc.get_str("user").ok().map(str::to_string) {
                if self.users.contains(&user) {
                    self.replace_user(&ns, &user, &doc);
                    return Ok(());
                }
            }
        }

        self.insert_document(&ns, &doc);
        Ok(())
    }

    fn replace_user(&mut self, ns: &Namespace, user: &str, doc: &Document) {
        debug!(ns = %ns, user = %user, "Updating existing user");
        if let Err(e) = self.conn.update(ns, doc! { "user": user }, doc) {
            error!(ns = %ns, user = %user, error = %e, "Failed to update user");
        }
        self.users.take(user);
        self.report.documents_updated += 1;
        self.await_replication(&ns.db, "");
    }

    fn insert_document(&mut self, ns: &Namespace, doc: &Document) {
        if let Err(e) = self.conn.insert(ns, doc) {
            error!(ns = %ns, error = %e, "Failed to insert document");
        }
        self.report.documents_inserted += 1;
        self.await_replication(&ns.db, "");
    }
}
