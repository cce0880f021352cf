//! Sidecar metadata loader

use crate::codec::decode_metadata;
use crate::error::MetadataError;
use crate::types::METADATA_SUFFIX;
use bson::{Bson, Document};
use std::path::{Path, PathBuf};

/// Creation options and index definitions recorded for one collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionMetadata {
    pub options: Option<Document>,
    pub indexes: Vec<Document>,
}

impl CollectionMetadata {
    pub fn from_document(doc: &Document) -> Result<Self, MetadataError> {
        let options = match doc.get("options") {
            None => None,
            Some(Bson::Document(options)) => Some(options.clone()),
            Some(other) => {
                return Err(MetadataError::Shape(format!(
                    "options must be a document, found {:?}",
                    other.element_type()
                )))
            }
        };

        let indexes = match doc.get("indexes") {
            None => Vec::new(),
            Some(Bson::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Bson::Document(index) => Ok(index.clone()),
                    other => Err(MetadataError::Shape(format!(
                        "index definitions must be documents, found {:?}",
                        other.element_type()
                    ))),
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(MetadataError::Shape(format!(
                    "indexes must be an array, found {:?}",
                    other.element_type()
                )))
            }
        };

        Ok(Self { options, indexes })
    }
}

/// Sidecar path for a data file: `<dir>/<collection>.metadata.json`
pub fn metadata_path(data_file: &Path) -> PathBuf {
    let name = data_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name.as_str(),
    };
    data_file.with_file_name(format!("{}{}", stem, METADATA_SUFFIX))
}

/// Read and decode a sidecar file. Absence is the caller's concern; any
/// failure here means the file exists but cannot be used.
pub fn load_metadata(path: &Path) -> Result<CollectionMetadata, MetadataError> {
    let text = std::fs::read_to_string(path)?;
    let doc = decode_metadata(&text)?;
    CollectionMetadata::from_document(&doc)
}
