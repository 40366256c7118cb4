//! Plugin facade: loading a plugin file, extracting translatable strings,
//! applying translations and serializing the plugin back.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{error, info};

use crate::error::{Error, Result};
use crate::group::{Group, GroupChild};
use crate::record::{Record, RecordFlags};
use crate::string_records;
use crate::strings::{is_valid_string, PluginString, Status};
use crate::subrecord::{StringSubrecord, Subrecord};

/// Where a string subrecord lives inside the group tree, as child indices.
#[derive(Debug, Clone)]
struct StringLocation {
    group: usize,
    /// Indices down the group tree; the last one selects the record.
    children: Vec<usize>,
    subrecord: usize,
}

#[derive(Debug, Clone)]
struct IndexedString {
    descriptor: PluginString,
    location: StringLocation,
}

struct ExtractContext {
    masters: Vec<String>,
    file_name: String,
    light: bool,
    extract_localized: bool,
    unfiltered: bool,
}

/// A parsed plugin file: the `TES4` header record and the top-level groups.
#[derive(Debug)]
pub struct Plugin {
    pub path: PathBuf,
    pub header: Record,
    pub groups: Vec<Group>,
    /// Built lazily on the first replacement call.
    string_index: Option<Vec<IndexedString>>,
}

impl Plugin {
    /// Reads and parses a plugin file.
    pub fn load(path: impl Into<PathBuf>) -> Result<Plugin> {
        let path = path.into();
        let bytes = fs::read(&path).map_err(|error| match error.kind() {
            io::ErrorKind::NotFound => Error::FileNotFound(path.clone()),
            _ => Error::Io(error),
        })?;
        Plugin::parse(path, &bytes)
    }

    /// Parses plugin bytes. The path only names the plugin (for master
    /// resolution and the light-plugin check); no file access happens.
    pub fn parse(path: impl Into<PathBuf>, input: &[u8]) -> Result<Plugin> {
        let path = path.into();
        info!("parsing plugin {}", path.display());
        let table = string_records::shared();
        let (input, header) = Record::parse(input, RecordFlags::empty(), table)?;
        if header.record_type != "TES4" {
            return Err(Error::MalformedTag(header.record_type.into_bytes()));
        }
        let header_flags = header.known_flags();
        let mut groups = Vec::new();
        let mut input = input;
        while !input.is_empty() {
            let (rest, group) = Group::parse(input, header_flags, table)?;
            groups.push(group);
            input = rest;
        }
        info!(
            "parsed {} top-level groups from {}",
            groups.len(),
            path.display()
        );
        Ok(Plugin {
            path,
            header,
            groups,
            string_index: None,
        })
    }

    /// Serializes the plugin back to bytes.
    pub fn dump(&self) -> Result<Vec<u8>> {
        let mut data = self.header.dump()?;
        for group in &self.groups {
            data.extend(group.dump()?);
        }
        Ok(data)
    }

    /// Master file names from the header, in declaration order.
    pub fn masters(&self) -> Vec<String> {
        self.header
            .subrecords
            .iter()
            .filter_map(|subrecord| match subrecord {
                Subrecord::Mast(mast) => Some(mast.file.text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether this plugin is a light plugin, by file suffix or header flag.
    pub fn is_light_plugin(&self) -> bool {
        has_light_extension(&self.path) || self.header.has_flag(RecordFlags::LIGHT_MASTER_FILE)
    }

    /// Whether the file at `path` is a light plugin. Only the header record
    /// is parsed when the suffix alone does not decide it.
    pub fn is_light(path: &Path) -> Result<bool> {
        if has_light_extension(path) {
            return Ok(true);
        }
        let bytes = fs::read(path).map_err(|error| match error.kind() {
            io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(error),
        })?;
        let (_, header) = Record::parse(&bytes, RecordFlags::empty(), string_records::shared())?;
        Ok(header.has_flag(RecordFlags::LIGHT_MASTER_FILE))
    }

    fn extract_context(&self, extract_localized: bool, unfiltered: bool) -> ExtractContext {
        ExtractContext {
            masters: self.masters(),
            file_name: self
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            light: self.is_light_plugin(),
            extract_localized,
            unfiltered,
        }
    }

    /// Walks all groups and yields one descriptor per translatable string.
    ///
    /// Localized plugins store ids instead of text; those are skipped
    /// unless `extract_localized`. Strings failing the validity filter are
    /// skipped unless `unfiltered`. Within one top-level group, duplicate
    /// fingerprints collapse to the first occurrence.
    pub fn extract_strings(&self, extract_localized: bool, unfiltered: bool) -> Vec<PluginString> {
        let ctx = self.extract_context(extract_localized, unfiltered);
        let mut all = Vec::new();
        for (top_index, group) in self.groups.iter().enumerate() {
            let mut entries = Vec::new();
            let mut seen = HashMap::new();
            let mut path = Vec::new();
            collect_group(group, top_index, &mut path, &ctx, &mut entries, &mut seen);
            all.extend(entries.into_iter().map(|entry| entry.descriptor));
        }
        all
    }

    fn ensure_string_index(&mut self) {
        if self.string_index.is_some() {
            return;
        }
        let ctx = self.extract_context(false, false);
        let mut entries = Vec::new();
        let mut seen = HashMap::new();
        for (top_index, group) in self.groups.iter().enumerate() {
            let mut path = Vec::new();
            collect_group(group, top_index, &mut path, &ctx, &mut entries, &mut seen);
        }
        self.string_index = Some(entries);
    }

    fn find_string_location(&self, string: &PluginString) -> Option<StringLocation> {
        let index = self.string_index.as_ref()?;
        let tail = form_id_tail(string.form_id.as_deref()?);
        index
            .iter()
            .find(|entry| {
                entry.descriptor.form_id.as_deref().map(form_id_tail) == Some(tail)
                    && entry.descriptor.kind == string.kind
                    && entry.descriptor.original_string == string.original_string
                    && entry.descriptor.index == string.index
            })
            .map(|entry| entry.location.clone())
    }

    /// Applies translated descriptors to the matching string subrecords,
    /// preserving each subrecord's text encoding. Descriptors that match
    /// nothing are logged and skipped.
    pub fn replace_strings(&mut self, strings: &[PluginString]) {
        self.ensure_string_index();
        for string in strings {
            let translated = match &string.translated_string {
                Some(translated) => translated.clone(),
                None => {
                    error!(
                        "failed to replace string {:?}: no translation attached",
                        string.original_string
                    );
                    continue;
                }
            };
            let subrecord = self
                .find_string_location(string)
                .and_then(|location| string_subrecord_at_mut(&mut self.groups, &location));
            match subrecord {
                Some(subrecord) => subrecord.set_string(&translated),
                None => error!(
                    "failed to replace string {:?}: subrecord not found",
                    string.original_string
                ),
            }
        }
    }
}

fn has_light_extension(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.to_string_lossy().eq_ignore_ascii_case("esl"))
}

/// The form id with the master-index byte stripped.
fn form_id_tail(form_id: &str) -> &str {
    form_id.get(2..).unwrap_or(form_id)
}

fn string_subrecord_at_mut<'a>(
    groups: &'a mut [Group],
    location: &StringLocation,
) -> Option<&'a mut StringSubrecord> {
    let mut group = groups.get_mut(location.group)?;
    let (record_index, group_path) = location.children.split_last()?;
    for &index in group_path {
        group = match group.children.get_mut(index)? {
            GroupChild::Group(inner) => inner,
            GroupChild::Record(_) => return None,
        };
    }
    let record = match group.children.get_mut(*record_index)? {
        GroupChild::Record(record) => record,
        GroupChild::Group(_) => return None,
    };
    record.subrecords.get_mut(location.subrecord)?.as_text_mut()
}

fn collect_group(
    group: &Group,
    top_index: usize,
    path: &mut Vec<usize>,
    ctx: &ExtractContext,
    entries: &mut Vec<IndexedString>,
    seen: &mut HashMap<PluginString, usize>,
) {
    for (child_index, child) in group.children.iter().enumerate() {
        path.push(child_index);
        match child {
            GroupChild::Group(inner) => {
                collect_group(inner, top_index, path, ctx, entries, seen)
            }
            GroupChild::Record(record) => {
                collect_record(record, top_index, path, ctx, entries, seen)
            }
        }
        path.pop();
    }
}

fn collect_record(
    record: &Record,
    top_index: usize,
    path: &[usize],
    ctx: &ExtractContext,
    entries: &mut Vec<IndexedString>,
    seen: &mut HashMap<PluginString, usize>,
) {
    let editor_id = record.editor_id().map(|raw| raw.text.clone());
    let master_index =
        usize::from_str_radix(&record.form_id[..2], 16).unwrap_or(ctx.masters.len());
    let master = ctx
        .masters
        .get(master_index)
        .cloned()
        .unwrap_or_else(|| ctx.file_name.clone());
    let mut form_id = format!("{}|{}", record.form_id, master);
    if ctx.light && master == ctx.file_name {
        form_id.replace_range(..2, "FE");
    }

    for (subrecord_index, subrecord) in record.subrecords.iter().enumerate() {
        let text_subrecord = match subrecord.as_text() {
            Some(text_subrecord) => text_subrecord,
            None => continue,
        };
        if text_subrecord.is_localized() && !ctx.extract_localized {
            continue;
        }
        let value = text_subrecord.text();
        let valid = is_valid_string(&value);
        if !valid && !ctx.unfiltered {
            continue;
        }
        let descriptor = PluginString {
            editor_id: editor_id.clone(),
            form_id: Some(form_id.clone()),
            index: text_subrecord.index,
            kind: format!("{} {}", record.record_type, text_subrecord.tag),
            original_string: value,
            translated_string: None,
            status: if valid {
                Status::TranslationRequired
            } else {
                Status::NoTranslationRequired
            },
        };
        let location = StringLocation {
            group: top_index,
            children: path.to_vec(),
            subrecord: subrecord_index,
        };
        match seen.get(&descriptor) {
            // Duplicate fingerprint: keep the first descriptor but point
            // it at the latest subrecord.
            Some(&existing) => entries[existing].location = location,
            None => {
                seen.insert(descriptor.clone(), entries.len());
                entries.push(IndexedString {
                    descriptor,
                    location,
                });
            }
        }
    }
}
