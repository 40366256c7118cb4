//! Table of the subrecord tags that hold translatable text, keyed by
//! record type.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::OnceLock;

use serde::Deserialize;

use crate::error::{Error, Result};

static SHARED: OnceLock<StringRecords> = OnceLock::new();

const DEFAULT_TABLE: &str = include_str!("../data/string_records.json");

/// Immutable record-type → translatable-tag mapping. The record codec takes
/// it as a parameter so no mutable process-wide state is involved.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct StringRecords(HashMap<String, Vec<String>>);

impl StringRecords {
    pub fn from_json(json: &str) -> Result<StringRecords> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<StringRecords> {
        let file = File::open(path).map_err(|error| match error.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(error),
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Whether `tag` holds translatable text inside a record of
    /// `record_type`.
    pub fn is_string_tag(&self, record_type: &str, tag: &str) -> bool {
        self.0
            .get(record_type)
            .map_or(false, |tags| tags.iter().any(|t| t == tag))
    }
}

/// The process-wide table. Defaults to the compiled-in
/// `data/string_records.json`; [`init_from_file`] installs a replacement if
/// called before first use.
pub fn shared() -> &'static StringRecords {
    SHARED.get_or_init(|| {
        serde_json::from_str(DEFAULT_TABLE).expect("embedded string_records.json is valid")
    })
}

/// Loads a custom table and installs it as the shared one. Returns `false`
/// when the shared table was already initialized and the call had no
/// effect.
pub fn init_from_file(path: &Path) -> Result<bool> {
    let table = StringRecords::load(path)?;
    Ok(SHARED.set(table).is_ok())
}
