//! CLI output: error mapping from restore errors to the stable CLI surface.

use crate::error::RestoreError;

/// Map restore errors to the line printed before exiting.
/// Nested metadata and codec causes are spelled out since they name the bad file.
pub fn map_error(e: &RestoreError) -> String {
    match e {
        RestoreError::Metadata { path, source } => {
            format!("Error: bad metadata file {}: {}", path.display(), source)
        }
        RestoreError::Codec { path, source } => {
            format!("Error: cannot read {}: {}", path.display(), source)
        }
        other => format!("Error: {}", other),
    }
}
