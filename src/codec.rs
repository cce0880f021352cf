//! Document codec: length-prefixed BSON streams and Extended JSON metadata text.

use crate::error::{CodecError, JsonDocumentError, MetadataError};
use bson::{Bson, Document};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::Path;

/// Largest document accepted from a dump (user limit plus internal headroom)
pub const MAX_DOCUMENT_SIZE: i32 = 16 * 1024 * 1024 + 16 * 1024;

/// Smallest well-formed document: length prefix plus terminator
const MIN_DOCUMENT_SIZE: i32 = 5;

/// Lazy, finite, non-restartable sequence of documents read from a byte stream.
///
/// A clean end of input between two documents ends the stream. Anything else
/// (a short length prefix, a truncated body, an undecodable document) yields a
/// single error and then ends the stream.
pub struct DocumentStream<R> {
    reader: R,
    finished: bool,
}

impl<R: Read> DocumentStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            finished: false,
        }
    }

    fn read_document(&mut self) -> Result<Option<Document>, CodecError> {
        let mut prefix = [0u8; 4];
        let read = read_full(&mut self.reader, &mut prefix)?;
        if read == 0 {
            return Ok(None);
        }
        if read < prefix.len() {
            return Err(CodecError::Truncated { declared: 4, read });
        }

        let declared = i32::from_le_bytes(prefix);
        if !(MIN_DOCUMENT_SIZE..=MAX_DOCUMENT_SIZE).contains(&declared) {
            return Err(CodecError::InvalidLength(declared));
        }

        let mut buf = vec![0u8; declared as usize];
        buf[..4].copy_from_slice(&prefix);
        let body = read_full(&mut self.reader, &mut buf[4..])?;
        if body + 4 < buf.len() {
            return Err(CodecError::Truncated {
                declared: buf.len(),
                read: body + 4,
            });
        }

        Ok(Some(Document::from_reader(&buf[..])?))
    }
}

impl DocumentStream<BufReader<File>> {
    /// Open a dump data file
    pub fn open(path: &Path) -> Result<Self, CodecError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> Iterator for DocumentStream<R> {
    type Item = Result<Document, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_document() {
            Ok(Some(doc)) => Some(Ok(doc)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill `buf` from `reader`, returning how many bytes were read before end of input
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, CodecError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CodecError::Io(e)),
        }
    }
    Ok(filled)
}

/// Encode documents back to back, the layout `DocumentStream` reads
pub fn write_documents<W: Write>(mut writer: W, docs: &[Document]) -> Result<(), CodecError> {
    for doc in docs {
        doc.to_writer(&mut writer)
            .map_err(|e| CodecError::Io(std::io::Error::new(ErrorKind::Other, e.to_string())))?;
    }
    writer.flush()?;
    Ok(())
}

/// Decode Extended JSON text holding a single object
pub fn decode_json_document(text: &str) -> Result<Document, JsonDocumentError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match Bson::try_from(value).map_err(|e| JsonDocumentError::ExtendedJson(e.to_string()))? {
        Bson::Document(doc) => Ok(doc),
        other => Err(JsonDocumentError::NotAnObject(other.element_type())),
    }
}

/// Decode sidecar metadata text into one document
pub fn decode_metadata(text: &str) -> Result<Document, MetadataError> {
    Ok(decode_json_document(text)?)
}
