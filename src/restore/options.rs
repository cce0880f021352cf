//! Collection creation from dumped options

use super::RestoreSession;
use crate::connection::{command_succeeded, error_message};
use crate::error::RestoreError;
use crate::filter::values_equal;
use crate::types::Namespace;
use bson::{Bson, Document};
use tracing::{info, warn};

/// Build a `create` command for `collection` from dumped options.
///
/// Returns the command and the names of fields dropped because their value
/// was undefined. A `create` key in the dumped options is replaced.
pub fn build_create_command(collection: &str, declared: &Document) -> (Document, Vec<String>) {
    let mut command = Document::new();
    command.insert("create", collection);

    let mut skipped = Vec::new();
    for (key, value) in declared {
        if key == "create" {
            continue;
        }
        if matches!(value, Bson::Undefined) {
            skipped.push(key.clone());
            continue;
        }
        command.insert(key.clone(), value.clone());
    }
    (command, skipped)
}

/// Whether a create command describes the options a server recorded.
/// The `create` key is ignored when the server does not record it.
pub fn options_same(command: &Document, existing: &Document) -> bool {
    let mut compared = 0;
    for (key, value) in command {
        match existing.get(key) {
            None if key == "create" => continue,
            None => return false,
            Some(recorded) => {
                compared += 1;
                if !values_equal(value, recorded) {
                    return false;
                }
            }
        }
    }
    compared == existing.len()
}

impl RestoreSession<'_> {
    /// Create `ns` with dumped options, unless it already exists
    pub(crate) fn create_collection_with_options(
        &mut self,
        ns: &Namespace,
        declared: &Document,
    ) -> Result<(), RestoreError> {
        let (command, skipped) = build_create_command(&ns.collection, declared);
        for field in &skipped {
            info!(ns = %ns, "skipping undefined field: {}", field);
        }

        if let Some(existing) = self.conn.find_collection(ns)? {
            if !options_same(&command, &existing) {
                warn!(
                    ns = %ns,
                    "collection {} exists with different options than are in the metadata.json file and not using --drop. Options in the metadata file will be ignored.",
                    ns
                );
            }
            return Ok(());
        }

        let reply = self.conn.run_command(&ns.db, command.clone())?;
        if !command_succeeded(&reply) {
            return Err(RestoreError::CollectionCreateFailed {
                ns: ns.to_string(),
                message: error_message(&reply),
            });
        }

        info!(
            ns = %ns,
            "Created collection {} with options: {}",
            ns,
            Bson::Document(command).into_relaxed_extjson()
        );
        self.report.collections_created += 1;
        Ok(())
    }
}
