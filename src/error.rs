//! Error types for plugin parsing and serialization.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for plugin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced while parsing, mutating or re-serializing a plugin.
#[derive(Error, Debug)]
pub enum Error {
    /// The plugin file does not exist
    #[error("plugin file not found: {0}")]
    FileNotFound(PathBuf),

    /// The input ended before a field could be read in full
    #[error("truncated input")]
    TruncatedInput,

    /// A record, subrecord or group tag was not 4 ASCII characters
    #[error("malformed record tag: {0:02X?}")]
    MalformedTag(Vec<u8>),

    /// zlib inflate failed on a record with the `Compressed` flag set
    #[error("corrupt compressed record {form_id}: {source}")]
    CorruptCompressedRecord { form_id: String, source: io::Error },

    /// A `GRUP` header carried a group type outside 0..=9
    #[error("unknown group type: {0}")]
    UnknownGroupType(i32),

    /// A stored hex identifier could not be parsed back into bytes
    #[error("invalid hex string: {0:?}")]
    InvalidHex(String),

    /// A JSON document (string table or descriptor list) failed to parse
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
