//! Record codec: the 24-byte record header, zlib-compressed payloads and
//! the subrecord walks, including the context-sensitive string indexing
//! for `INFO`, `PERK` and `QUST` records.

use std::borrow::Cow;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::warn;

use crate::error::{Error, Result};
use crate::primitives::{
    dump_hex, peek_tag, read_bytes, read_hex, read_tag, read_u16, read_u32, Parsed, RawString,
};
use crate::string_records::StringRecords;
use crate::subrecord::Subrecord;
use crate::util::{get_checksum, payload_hash};

bitflags! {
    pub struct RecordFlags: u32 {
        const MASTER_FILE = 0x00000001;
        const DELETED_GROUP = 0x00000010;
        const DELETED_RECORD = 0x00000020;
        const CONSTANT = 0x00000040;
        const LOCALIZED = 0x00000080;
        const INACCESSIBLE = 0x00000100;
        const LIGHT_MASTER_FILE = 0x00000200;
        const PERSISTENT_REFR = 0x00000400;
        const INITIALLY_DISABLED = 0x00000800;
        const IGNORED = 0x00001000;
        const VISIBLE_WHEN_DISTANT = 0x00008000;
        const RANDOM_ANIM_START = 0x00010000;
        const OFF_LIMITS = 0x00020000;
        const COMPRESSED = 0x00040000;
        const CANT_WAIT = 0x00080000;
        const IGNORE_OBJECT_INTERACTION = 0x00100000;
        const IS_MARKER = 0x00800000;
        const NO_AI_ACQUIRE = 0x02000000;
        const NAVMESH_FILTER = 0x04000000;
        const NAVMESH_BOUNDING_BOX = 0x08000000;
        const REFLECTED_BY_AUTO_WATER = 0x10000000;
        const DONT_HAVOK_SETTLE = 0x20000000;
        const NO_RESPAWN = 0x40000000;
        const MULTI_BOUND = 0x80000000;
    }
}

/// One parsed record: header fields plus the ordered subrecord list.
///
/// `flags` keeps the raw 32 bits so unknown flags survive a round-trip;
/// [`Record::has_flag`] consults the known ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub record_type: String,
    pub size: u32,
    pub flags: u32,
    /// 8-char uppercase hex; the top byte indexes the plugin's masters.
    pub form_id: String,
    pub timestamp: u16,
    pub version_control_info: u16,
    pub internal_version: u16,
    pub unknown: u16,
    pub subrecords: Vec<Subrecord>,
}

impl Record {
    pub fn has_flag(&self, flag: RecordFlags) -> bool {
        RecordFlags::from_bits_truncate(self.flags).contains(flag)
    }

    /// Known flags of this record; unknown bits are dropped from the view
    /// but kept in `flags`.
    pub fn known_flags(&self) -> RecordFlags {
        RecordFlags::from_bits_truncate(self.flags)
    }

    /// The record's `EDID` editor id, if it has one.
    pub fn editor_id(&self) -> Option<&RawString> {
        self.subrecords.iter().find_map(|subrecord| match subrecord {
            Subrecord::Edid(edid) => Some(&edid.editor_id),
            _ => None,
        })
    }

    pub fn parse<'a>(
        input: &'a [u8],
        header_flags: RecordFlags,
        table: &StringRecords,
    ) -> Parsed<'a, Record> {
        let (input, record_type) = read_tag(input)?;
        let (input, size) = read_u32(input)?;
        let (input, flags) = read_u32(input)?;
        let (input, form_id) = read_hex(input)?;
        let (input, timestamp) = read_u16(input)?;
        let (input, version_control_info) = read_u16(input)?;
        let (input, internal_version) = read_u16(input)?;
        let (input, unknown) = read_u16(input)?;
        let (input, payload) = read_bytes(input, size as usize)?;

        let mut record = Record {
            record_type,
            size,
            flags,
            form_id,
            timestamp,
            version_control_info,
            internal_version,
            unknown,
            subrecords: Vec::new(),
        };

        let data: Cow<[u8]> = if record.has_flag(RecordFlags::COMPRESSED) {
            let (compressed, decompressed_size) = read_u32(payload)?;
            let mut buf = Vec::with_capacity(decompressed_size as usize);
            ZlibDecoder::new(compressed)
                .read_to_end(&mut buf)
                .map_err(|source| Error::CorruptCompressedRecord {
                    form_id: record.form_id.clone(),
                    source,
                })?;
            record.size = decompressed_size;
            Cow::Owned(buf)
        } else {
            Cow::Borrowed(payload)
        };

        let localized = header_flags.contains(RecordFlags::LOCALIZED);
        match record.record_type.as_str() {
            "INFO" => record.parse_info_subrecords(&data, localized, table)?,
            "PERK" => record.parse_perk_subrecords(&data, localized, table)?,
            "QUST" => record.parse_qust_subrecords(&data, localized, table)?,
            _ => record.parse_subrecords(&data, localized, table)?,
        }
        Ok((input, record))
    }

    fn is_string_tag(&self, data: &[u8], table: &StringRecords) -> bool {
        peek_tag(data).map_or(false, |tag| table.is_string_tag(&self.record_type, tag))
    }

    fn parse_subrecords(
        &mut self,
        mut data: &[u8],
        localized: bool,
        table: &StringRecords,
    ) -> Result<()> {
        let mut itxt_index: i64 = 0;
        while !data.is_empty() {
            let as_string = self.is_string_tag(data, table);
            let (rest, mut subrecord) = Subrecord::parse(data, localized, as_string)?;
            data = rest;
            if subrecord.tag() == "ITXT" {
                subrecord.set_index(itxt_index);
                itxt_index += 1;
            }
            self.subrecords.push(subrecord);
        }
        Ok(())
    }

    /// Index for a `CNAM` log entry: the digit checksum over the hashes of
    /// the trailing run of `CTDA` subrecords, offset by the current stage
    /// hash. Stable as long as the conditions and stage stay unchanged.
    fn condition_index(&self, stage_index: u64) -> i64 {
        let mut sum: i128 = 0;
        for subrecord in self.subrecords.iter().rev() {
            if subrecord.tag() != "CTDA" {
                break;
            }
            if let Some(data) = subrecord.raw_data() {
                sum += payload_hash(data) as i128;
            }
        }
        get_checksum(sum - stage_index as i128)
    }

    fn parse_qust_subrecords(
        &mut self,
        mut data: &[u8],
        localized: bool,
        table: &StringRecords,
    ) -> Result<()> {
        let mut current_stage_index: u64 = 0;
        let mut current_objective_index: i64 = 0;
        while !data.is_empty() {
            let as_string = self.is_string_tag(data, table);
            let (rest, mut subrecord) = Subrecord::parse(data, localized, as_string)?;
            data = rest;
            match subrecord.tag() {
                "INDX" => {
                    if let Some(payload) = subrecord.raw_data() {
                        current_stage_index = payload_hash(payload);
                    }
                }
                "CNAM" => {
                    let index = self.condition_index(current_stage_index);
                    subrecord.set_index(index);
                }
                "QOBJ" => {
                    if let Subrecord::Qobj(qobj) = &subrecord {
                        current_objective_index = i64::from(qobj.index);
                    }
                }
                "NNAM" => subrecord.set_index(current_objective_index),
                _ => {}
            }
            self.subrecords.push(subrecord);
        }
        Ok(())
    }

    fn parse_info_subrecords(
        &mut self,
        mut data: &[u8],
        localized: bool,
        table: &StringRecords,
    ) -> Result<()> {
        let mut current_index: i64 = 0;
        while !data.is_empty() {
            let as_string = self.is_string_tag(data, table);
            let (rest, mut subrecord) = Subrecord::parse(data, localized, as_string)?;
            data = rest;
            match subrecord.tag() {
                "TRDT" => {
                    if let Subrecord::Trdt(trdt) = &subrecord {
                        current_index = i64::from(trdt.response_id);
                    }
                }
                "NAM1" => subrecord.set_index(current_index),
                _ => {}
            }
            self.subrecords.push(subrecord);
        }
        Ok(())
    }

    fn parse_perk_subrecords(
        &mut self,
        mut data: &[u8],
        localized: bool,
        table: &StringRecords,
    ) -> Result<()> {
        let mut perk_type: Option<u8> = None;
        let mut epfd_index: i64 = 0;
        while !data.is_empty() {
            // EPFD and EPF2 hold text only for specific entry point
            // function types; everything else goes through the table.
            let as_string = match (perk_type, peek_tag(data)) {
                (Some(4), Some("EPF2")) | (Some(7), Some("EPFD")) => true,
                _ => self.is_string_tag(data, table),
            };
            let (rest, mut subrecord) = Subrecord::parse(data, localized, as_string)?;
            data = rest;
            match subrecord.tag() {
                "EPFT" => {
                    if let Subrecord::Epft(epft) = &subrecord {
                        perk_type = Some(epft.perk_type);
                    }
                }
                "EPFD" => {
                    subrecord.set_index(epfd_index);
                    epfd_index += 1;
                }
                _ => {}
            }
            let is_epf2 = subrecord.tag() == "EPF2";
            self.subrecords.push(subrecord);

            if is_epf2 {
                if peek_tag(data) == Some("EPF3") {
                    let (rest, follower) = Subrecord::parse(data, localized, false)?;
                    data = rest;
                    if let Some(raw) = follower.raw_data() {
                        // Little-endian value of the payload past the
                        // leading two bytes; longer payloads fold with
                        // wrapping arithmetic, reducing modulo 2^64.
                        let mut index: u64 = 0;
                        for &byte in raw.iter().skip(2).rev() {
                            index = index.wrapping_mul(256).wrapping_add(u64::from(byte));
                        }
                        if let Some(epf2) = self.subrecords.last_mut() {
                            epf2.set_index(index as i64);
                        }
                    }
                    self.subrecords.push(follower);
                } else {
                    warn!(
                        "EPF2 subrecord without a following EPF3 in record {}",
                        self.form_id
                    );
                }
            }
        }
        Ok(())
    }

    pub fn dump(&self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        for subrecord in &self.subrecords {
            payload.extend(subrecord.dump()?);
        }
        let payload = if self.has_flag(RecordFlags::COMPRESSED) {
            let mut compressed = (payload.len() as u32).to_le_bytes().to_vec();
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&payload)?;
            compressed.extend(encoder.finish()?);
            compressed
        } else {
            payload
        };

        let mut data = self.record_type.as_bytes().to_vec();
        data.extend((payload.len() as u32).to_le_bytes());
        data.extend(self.flags.to_le_bytes());
        data.extend(dump_hex(&self.form_id)?);
        data.extend(self.timestamp.to_le_bytes());
        data.extend(self.version_control_info.to_le_bytes());
        data.extend(self.internal_version.to_le_bytes());
        data.extend(self.unknown.to_le_bytes());
        data.extend(payload);
        Ok(data)
    }
}
