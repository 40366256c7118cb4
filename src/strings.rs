//! Translatable-string descriptors and the filter deciding which strings
//! are worth translating.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Characters allowed even though they are not printable.
const CHAR_WHITELIST: [char; 6] = ['\n', '\r', '\t', '\u{200b}', '\u{a0}', '\u{3000}'];

/// Texts that are never worth translating.
const STRING_BLACKLIST: [&str; 1] = ["<p>"];

/// Texts that look like identifiers but are real in-game names.
const STRING_WHITELIST: [&str; 2] = ["WoollyRhino", "CuSith"];

/// Translation state of a string, as tracked by the surrounding tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NoTranslationRequired,
    TranslationComplete,
    TranslationIncomplete,
    TranslationRequired,
}

impl Status {
    pub fn name(self) -> &'static str {
        match self {
            Status::NoTranslationRequired => "NoTranslationRequired",
            Status::TranslationComplete => "TranslationComplete",
            Status::TranslationIncomplete => "TranslationIncomplete",
            Status::TranslationRequired => "TranslationRequired",
        }
    }

    pub fn from_name(name: &str) -> Option<Status> {
        match name {
            "NoTranslationRequired" => Some(Status::NoTranslationRequired),
            "TranslationComplete" => Some(Status::TranslationComplete),
            "TranslationIncomplete" => Some(Status::TranslationIncomplete),
            "TranslationRequired" => Some(Status::TranslationRequired),
            _ => None,
        }
    }
}

/// One translatable string extracted from a plugin.
///
/// Two descriptors are equal when their fingerprints
/// `(form_id lowercased, editor_id, index, kind)` are equal, so a
/// reparsed plugin yields descriptors that match saved translations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "StringData", into = "StringData")]
pub struct PluginString {
    /// Editor id of the enclosing record; not every record has one.
    pub editor_id: Option<String>,
    /// `"{FORMID}|{master}"`, identifying the record across plugins.
    pub form_id: Option<String>,
    /// Disambiguates multiple strings inside one record.
    pub index: Option<i64>,
    /// Record and subrecord type pair, e.g. `"WEAP FULL"`.
    pub kind: String,
    pub original_string: String,
    pub translated_string: Option<String>,
    pub status: Status,
}

impl PluginString {
    fn fingerprint(&self) -> (Option<String>, &Option<String>, Option<i64>, &str) {
        (
            self.form_id.as_ref().map(|f| f.to_lowercase()),
            &self.editor_id,
            self.index,
            &self.kind,
        )
    }
}

impl PartialEq for PluginString {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for PluginString {}

impl Hash for PluginString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint().hash(state);
    }
}

/// Wire form of a descriptor. Translated entries store the source text
/// under `original` and the translation under `string`; untranslated ones
/// store the source text under `string`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StringData {
    editor_id: Option<String>,
    form_id: Option<String>,
    index: Option<i64>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original: Option<String>,
    string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

impl From<StringData> for PluginString {
    fn from(data: StringData) -> PluginString {
        let mut editor_id = data.editor_id;
        let mut form_id = data.form_id;
        // Old exports stored bracketed form ids in the editor id field.
        if form_id.is_none() {
            if let Some(id) = &editor_id {
                if id.starts_with('[') && id.ends_with(']') {
                    form_id = editor_id.take();
                }
            }
        }
        let status = data.status.as_deref().and_then(Status::from_name);
        match data.original {
            Some(original) => PluginString {
                editor_id,
                form_id,
                index: data.index,
                kind: data.kind,
                original_string: original,
                translated_string: Some(data.string),
                status: status.unwrap_or(Status::TranslationComplete),
            },
            None => PluginString {
                editor_id,
                form_id,
                index: data.index,
                kind: data.kind,
                original_string: data.string,
                translated_string: None,
                status: status.unwrap_or(Status::TranslationRequired),
            },
        }
    }
}

impl From<PluginString> for StringData {
    fn from(string: PluginString) -> StringData {
        match string.translated_string {
            Some(translated) => StringData {
                editor_id: string.editor_id,
                form_id: string.form_id,
                index: string.index,
                kind: string.kind,
                original: Some(string.original_string),
                string: translated,
                status: Some(string.status.name().to_owned()),
            },
            None => StringData {
                editor_id: string.editor_id,
                form_id: string.form_id,
                index: string.index,
                kind: string.kind,
                original: None,
                string: string.original_string,
                status: Some(string.status.name().to_owned()),
            },
        }
    }
}

/// At least one cased character and no lowercase ones.
fn is_fully_uppercase(text: &str) -> bool {
    let mut has_cased = false;
    for c in text.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            has_cased = true;
        }
    }
    has_cased
}

/// CamelCase without spaces: an inner uppercase letter past the second
/// character in an alphanumeric-only, not fully uppercase text.
fn is_camel_case(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < 3 {
        return false;
    }
    chars[2..]
        .iter()
        .any(|c| c.is_uppercase() && c.is_alphabetic())
        && !is_fully_uppercase(text)
        && chars.iter().all(|c| c.is_alphanumeric())
}

fn is_snake_case(text: &str) -> bool {
    !text.contains(' ') && text.contains('_')
}

fn is_printable(c: char) -> bool {
    c == ' ' || (!c.is_control() && !c.is_whitespace())
}

/// Whether a string is worth surfacing for translation.
pub fn is_valid_string(text: &str) -> bool {
    if text.trim().is_empty() || STRING_BLACKLIST.contains(&text) {
        return false;
    }
    if STRING_WHITELIST.contains(&text) || text.contains("<Alias") {
        return true;
    }
    if is_camel_case(text) || is_snake_case(text) {
        return false;
    }
    text.chars()
        .all(|c| is_printable(c) || CHAR_WHITELIST.contains(&c))
}
