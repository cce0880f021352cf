//! Index builder
//!
//! Index definitions are rewritten for the target namespace, inserted into
//! the target database's index collection, and confirmed with a strict
//! acknowledgement. Unlike document inserts, index failures end the run.

use super::RestoreSession;
use crate::error::RestoreError;
use crate::filter::truthy;
use crate::types::{Namespace, NamespaceContext};
use bson::{Bson, Document};
use tracing::{debug, warn};

/// Last-error text a server returns when replica acknowledgement is requested
/// from a node that is not replicated
const NO_REPLICATION: &str = "norepl";

/// Outcome of a confirmed index build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAck {
    Confirmed,
    /// Replica acknowledgement was requested from a non-replicated server
    NonReplicaWarning,
}

/// Rewrite an index definition for `target`.
///
/// The namespace field becomes `target.db` joined with either the collection
/// named in the definition (`keep_collection_name`) or `target.collection`.
/// The format version field `v` is dropped unless `keep_index_version`.
pub fn rewrite_index_definition(
    definition: &Document,
    target: &Namespace,
    keep_collection_name: bool,
    keep_index_version: bool,
) -> Document {
    let mut rewritten = Document::new();
    let mut saw_ns = false;

    for (key, value) in definition {
        match key.as_str() {
            "ns" => {
                saw_ns = true;
                let original = value
                    .as_str()
                    .map(|ns| ns.split_once('.').map_or(ns, |(_, coll)| coll));
                let collection = match original {
                    Some(coll) if keep_collection_name => coll,
                    _ => target.collection.as_str(),
                };
                rewritten.insert("ns", format!("{}.{}", target.db, collection));
            }
            "v" if !keep_index_version => {}
            _ => {
                rewritten.insert(key.clone(), value.clone());
            }
        }
    }

    if !saw_ns && !keep_collection_name {
        rewritten.insert("ns", target.to_string());
    }

    rewritten
}

fn error_code(ack: &Document) -> String {
    match ack.get("code") {
        Some(Bson::Int32(code)) => code.to_string(),
        Some(Bson::Int64(code)) => code.to_string(),
        Some(Bson::Double(code)) => (*code as i64).to_string(),
        _ => String::new(),
    }
}

/// Classify the acknowledgement of an index insert
pub fn classify_index_ack(
    ack: &Document,
    write_concern: u32,
    index_ns: &str,
) -> Result<IndexAck, RestoreError> {
    if let Some(err) = ack.get("err").filter(|e| !matches!(e, Bson::Null)) {
        let message = match err {
            Bson::String(s) => s.clone(),
            other => other.to_string(),
        };
        if message == NO_REPLICATION && write_concern > 1 {
            return Ok(IndexAck::NonReplicaWarning);
        }
        return Err(RestoreError::IndexBuildFailed {
            ns: index_ns.to_string(),
            code: error_code(ack),
            message,
        });
    }

    if ack.get("ok").is_some_and(truthy) {
        Ok(IndexAck::Confirmed)
    } else {
        let detail = match ack.get("errmsg") {
            Some(Bson::String(msg)) => msg.clone(),
            Some(other) => other.to_string(),
            None => "acknowledgement carried no ok field".to_string(),
        };
        Err(RestoreError::AcknowledgementFailed(detail))
    }
}

impl RestoreSession<'_> {
    /// Build one index in the active collection's database
    pub(crate) fn build_index(
        &mut self,
        definition: Document,
        keep_collection_name: bool,
    ) -> Result<(), RestoreError> {
        let target = match &self.context {
            Some(NamespaceContext::Collection(ns)) => ns.clone(),
            _ => return Err(RestoreError::NoActiveNamespace),
        };

        let rewritten = rewrite_index_definition(
            &definition,
            &target,
            keep_collection_name,
            self.options.keep_index_version,
        );
        debug!(index = %Bson::Document(rewritten.clone()).into_relaxed_extjson(), "Creating index");

        let index_ns = rewritten
            .get_str("ns")
            .map(str::to_string)
            .unwrap_or_else(|_| target.to_string());

        self.conn.insert(&target.index_namespace(), &rewritten)?;
        let ack = self
            .conn
            .get_last_error_detailed(&target.db, self.options.write_concern)?;

        if classify_index_ack(&ack, self.options.write_concern, &index_ns)?
            == IndexAck::NonReplicaWarning
        {
            warn!(ns = %index_ns, "Cannot specify write concern for non-replicas");
        }
        self.report.indexes_built += 1;
        Ok(())
    }
}
