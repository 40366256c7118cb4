//! # Skyrim String Patch
//!
//! `skyrim-string-patch` is a library for parsing Skyrim SE plugin files
//! (`.esp`/`.esm`/`.esl`), extracting their translatable strings and
//! writing plugins back with translations applied.
//!
//! ```no_run
//! use skyrim_string_patch::Plugin;
//!
//! let plugin = Plugin::load("Plugin.esp").unwrap();
//! for string in plugin.extract_strings(false, false) {
//!     println!("{}: {}", string.kind, string.original_string);
//! }
//! ```
#[macro_use]
extern crate bitflags;

mod error;
mod group;
mod plugin;
pub mod primitives;
mod record;
pub mod string_records;
mod strings;
mod subrecord;
mod util;

pub use error::{Error, Result};
pub use group::{Group, GroupChild, GroupLabel, GroupType};
pub use plugin::Plugin;
pub use primitives::{Encoding, RawString};
pub use record::{Record, RecordFlags};
pub use strings::{is_valid_string, PluginString, Status};
pub use subrecord::{
    Edid, Epft, Hedr, Mast, Oversized, Qobj, StringSubrecord, StringValue, Subrecord, Trdt,
    UnknownSubrecord,
};
pub use util::get_checksum;
