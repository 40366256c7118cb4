//! Subrecord (field) codec: a single tagged payload inside a record.

use crate::error::Result;
use crate::primitives::{
    dump_hex, dump_zstring, read_bytes, read_f32, read_hex, read_i16, read_i32, read_tag,
    read_u16, read_u32, read_u8, read_zstring, Parsed, RawString,
};

/// Payload of a translatable subrecord: plain text in the plugin's native
/// encoding, or a string-table id when the plugin header is localized.
#[derive(Debug, Clone, PartialEq)]
pub enum StringValue {
    Text(RawString),
    Id(u32),
}

/// A subrecord whose payload holds translatable text.
#[derive(Debug, Clone, PartialEq)]
pub struct StringSubrecord {
    pub tag: String,
    pub value: StringValue,
    /// Disambiguates multiple strings inside one record; assigned by the
    /// record walker for `INFO`, `PERK` and `QUST` records and for `ITXT`.
    pub index: Option<i64>,
}

impl StringSubrecord {
    fn parse(tag: String, data: &[u8], localized: bool) -> Result<StringSubrecord> {
        let value = if localized {
            let (_, id) = read_u32(data)?;
            StringValue::Id(id)
        } else {
            let (_, text) = read_zstring(data);
            StringValue::Text(text)
        };
        Ok(StringSubrecord {
            tag,
            value,
            index: None,
        })
    }

    /// The current string value as text; localized ids render as decimal.
    pub fn text(&self) -> String {
        match &self.value {
            StringValue::Text(raw) => raw.text.clone(),
            StringValue::Id(id) => id.to_string(),
        }
    }

    pub fn is_localized(&self) -> bool {
        matches!(self.value, StringValue::Id(_))
    }

    /// Replaces the text, keeping the attached encoding where it can still
    /// represent the new value.
    pub fn set_string(&mut self, text: &str) {
        match &self.value {
            StringValue::Text(raw) => {
                self.value = StringValue::Text(RawString::from_str(text, raw.encoding));
            }
            StringValue::Id(id) => {
                log::warn!(
                    "refusing to overwrite localized string id {} with text {:?}",
                    id,
                    text
                );
            }
        }
    }

    fn dump_payload(&self) -> Vec<u8> {
        match &self.value {
            StringValue::Text(raw) => dump_zstring(raw),
            StringValue::Id(id) => id.to_le_bytes().to_vec(),
        }
    }
}

/// `HEDR`: plugin header descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Hedr {
    pub version: f32,
    pub records_num: u32,
    pub next_object_id: String,
}

impl Hedr {
    fn parse(data: &[u8]) -> Result<Hedr> {
        let (data, version) = read_f32(data)?;
        let (data, records_num) = read_u32(data)?;
        let (_, next_object_id) = read_hex(data)?;
        Ok(Hedr {
            version,
            records_num,
            next_object_id,
        })
    }

    fn dump_payload(&self) -> Result<Vec<u8>> {
        let mut bytes = self.version.to_le_bytes().to_vec();
        bytes.extend(self.records_num.to_le_bytes());
        bytes.extend(dump_hex(&self.next_object_id)?);
        Ok(bytes)
    }
}

/// `EDID`: editor id.
#[derive(Debug, Clone, PartialEq)]
pub struct Edid {
    pub editor_id: RawString,
}

/// `MAST`: master file name.
#[derive(Debug, Clone, PartialEq)]
pub struct Mast {
    pub file: RawString,
}

/// `TRDT`: dialogue response data.
#[derive(Debug, Clone, PartialEq)]
pub struct Trdt {
    pub emotion_type: u32,
    pub emotion_value: u32,
    pub unknown: i32,
    pub response_id: u8,
    pub junk1: [u8; 3],
    pub sound_file: String,
    pub use_emo_anim: u8,
    pub junk2: [u8; 3],
}

impl Trdt {
    fn parse(data: &[u8]) -> Result<Trdt> {
        let (data, emotion_type) = read_u32(data)?;
        let (data, emotion_value) = read_u32(data)?;
        let (data, unknown) = read_i32(data)?;
        let (data, response_id) = read_u8(data)?;
        let (data, junk1) = read_bytes(data, 3)?;
        let junk1 = [junk1[0], junk1[1], junk1[2]];
        let (data, sound_file) = read_hex(data)?;
        let (data, use_emo_anim) = read_u8(data)?;
        let (_, junk2) = read_bytes(data, 3)?;
        let junk2 = [junk2[0], junk2[1], junk2[2]];
        Ok(Trdt {
            emotion_type,
            emotion_value,
            unknown,
            response_id,
            junk1,
            sound_file,
            use_emo_anim,
            junk2,
        })
    }

    fn dump_payload(&self) -> Result<Vec<u8>> {
        let mut bytes = self.emotion_type.to_le_bytes().to_vec();
        bytes.extend(self.emotion_value.to_le_bytes());
        bytes.extend(self.unknown.to_le_bytes());
        bytes.push(self.response_id);
        bytes.extend(&self.junk1);
        bytes.extend(dump_hex(&self.sound_file)?);
        bytes.push(self.use_emo_anim);
        bytes.extend(&self.junk2);
        Ok(bytes)
    }
}

/// `QOBJ`: quest objective index.
#[derive(Debug, Clone, PartialEq)]
pub struct Qobj {
    pub index: i16,
}

/// `EPFT`: perk entry point function type.
#[derive(Debug, Clone, PartialEq)]
pub struct Epft {
    pub perk_type: u8,
}

/// `XXXX`: extended-size sentinel. The declared 2-byte size is the width of
/// the extended size integer; the following subrecord's bytes are captured
/// and re-emitted verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Oversized {
    /// Raw bytes of the extended size integer.
    pub ext_size: Vec<u8>,
    /// Real size of the following subrecord, decoded from `ext_size`.
    pub field_size: u64,
    /// Captured bytes of the following subrecord.
    pub data: Vec<u8>,
}

impl Oversized {
    fn parse(input: &[u8], size: u16) -> Parsed<Oversized> {
        let (input, ext) = read_bytes(input, size as usize)?;
        let ext_size = ext.to_vec();
        let mut field_size: u64 = 0;
        for (i, &byte) in ext_size.iter().enumerate().take(8) {
            field_size |= u64::from(byte) << (8 * i);
        }
        // The capture spans the follower's header and payload plus one
        // trailing byte; short input keeps whatever is left.
        let capture = (field_size + 7).min(input.len() as u64) as usize;
        let (input, data) = read_bytes(input, capture)?;
        Ok((
            input,
            Oversized {
                ext_size,
                field_size,
                data: data.to_vec(),
            },
        ))
    }

    fn dump(&self) -> Vec<u8> {
        let mut bytes = b"XXXX".to_vec();
        bytes.extend((self.ext_size.len() as u16).to_le_bytes());
        bytes.extend(&self.ext_size);
        bytes.extend(&self.data);
        bytes
    }
}

/// A subrecord with no specialized layout; round-trips verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownSubrecord {
    pub tag: String,
    pub data: Vec<u8>,
}

/// One parsed subrecord.
#[derive(Debug, Clone, PartialEq)]
pub enum Subrecord {
    Hedr(Hedr),
    Edid(Edid),
    Mast(Mast),
    Trdt(Trdt),
    Qobj(Qobj),
    Epft(Epft),
    Oversized(Oversized),
    Text(StringSubrecord),
    Unknown(UnknownSubrecord),
}

impl Subrecord {
    /// Parses one subrecord from the wire: 4-byte tag, 2-byte size, payload.
    /// `as_string` forces the translatable-string payload layout for tags
    /// the enclosing record marks as such.
    pub fn parse(input: &[u8], localized: bool, as_string: bool) -> Parsed<Subrecord> {
        let (input, tag) = read_tag(input)?;
        let (input, size) = read_u16(input)?;
        // String-tag membership takes priority over the typed dispatch,
        // the XXXX sentinel included.
        if as_string {
            let (input, data) = read_bytes(input, size as usize)?;
            let text = StringSubrecord::parse(tag, data, localized)?;
            return Ok((input, Subrecord::Text(text)));
        }
        if tag == "XXXX" {
            let (input, oversized) = Oversized::parse(input, size)?;
            return Ok((input, Subrecord::Oversized(oversized)));
        }
        let (input, data) = read_bytes(input, size as usize)?;
        let subrecord = match tag.as_str() {
            "HEDR" => Subrecord::Hedr(Hedr::parse(data)?),
            "EDID" => {
                let (_, editor_id) = read_zstring(data);
                Subrecord::Edid(Edid { editor_id })
            }
            "MAST" => {
                let (_, file) = read_zstring(data);
                Subrecord::Mast(Mast { file })
            }
            "TRDT" => Subrecord::Trdt(Trdt::parse(data)?),
            "QOBJ" => {
                let (_, index) = read_i16(data)?;
                Subrecord::Qobj(Qobj { index })
            }
            "EPFT" => {
                let (_, perk_type) = read_u8(data)?;
                Subrecord::Epft(Epft { perk_type })
            }
            _ => Subrecord::Unknown(UnknownSubrecord {
                tag,
                data: data.to_vec(),
            }),
        };
        Ok((input, subrecord))
    }

    pub fn tag(&self) -> &str {
        match self {
            Subrecord::Hedr(_) => "HEDR",
            Subrecord::Edid(_) => "EDID",
            Subrecord::Mast(_) => "MAST",
            Subrecord::Trdt(_) => "TRDT",
            Subrecord::Qobj(_) => "QOBJ",
            Subrecord::Epft(_) => "EPFT",
            Subrecord::Oversized(_) => "XXXX",
            Subrecord::Text(text) => &text.tag,
            Subrecord::Unknown(unknown) => &unknown.tag,
        }
    }

    /// Raw payload bytes, available only for unspecialized subrecords.
    pub fn raw_data(&self) -> Option<&[u8]> {
        match self {
            Subrecord::Unknown(unknown) => Some(&unknown.data),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&StringSubrecord> {
        match self {
            Subrecord::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut StringSubrecord> {
        match self {
            Subrecord::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Assigns a disambiguation index; a no-op for non-string subrecords.
    pub fn set_index(&mut self, index: i64) {
        if let Subrecord::Text(text) = self {
            text.index = Some(index);
        }
    }

    pub fn dump(&self) -> Result<Vec<u8>> {
        if let Subrecord::Oversized(oversized) = self {
            return Ok(oversized.dump());
        }
        let payload = match self {
            Subrecord::Hedr(hedr) => hedr.dump_payload()?,
            Subrecord::Edid(edid) => dump_zstring(&edid.editor_id),
            Subrecord::Mast(mast) => dump_zstring(&mast.file),
            Subrecord::Trdt(trdt) => trdt.dump_payload()?,
            Subrecord::Qobj(qobj) => qobj.index.to_le_bytes().to_vec(),
            Subrecord::Epft(epft) => vec![epft.perk_type],
            Subrecord::Text(text) => text.dump_payload(),
            Subrecord::Unknown(unknown) => unknown.data.clone(),
            Subrecord::Oversized(_) => unreachable!(),
        };
        let mut bytes = self.tag().as_bytes().to_vec();
        bytes.extend((payload.len() as u16).to_le_bytes());
        bytes.extend(payload);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::primitives::Encoding;

    fn wire(tag: &str, payload: &[u8]) -> Vec<u8> {
        let mut bytes = tag.as_bytes().to_vec();
        bytes.extend((payload.len() as u16).to_le_bytes());
        bytes.extend(payload);
        bytes
    }

    #[test]
    fn unknown_subrecords_round_trip_verbatim() {
        let input = wire("CTDA", &[0xDE, 0xAD, 0xBE, 0xEF]);
        let (rest, subrecord) = Subrecord::parse(&input, false, false).unwrap();
        assert!(rest.is_empty());
        assert_eq!(subrecord.tag(), "CTDA");
        assert_eq!(subrecord.raw_data(), Some(&[0xDE, 0xAD, 0xBE, 0xEF][..]));
        assert_eq!(subrecord.dump().unwrap(), input);
    }

    #[test]
    fn hedr_parses_and_round_trips() {
        let mut payload = 1.71f32.to_le_bytes().to_vec();
        payload.extend(1u32.to_le_bytes());
        payload.extend(0x800u32.to_le_bytes());
        let input = wire("HEDR", &payload);

        let (_, subrecord) = Subrecord::parse(&input, false, false).unwrap();
        match &subrecord {
            Subrecord::Hedr(hedr) => {
                assert!((hedr.version - 1.71).abs() < f32::EPSILON);
                assert_eq!(hedr.records_num, 1);
                assert_eq!(hedr.next_object_id, "00000800");
            }
            other => panic!("expected HEDR, got {:?}", other),
        }
        assert_eq!(subrecord.dump().unwrap(), input);
    }

    #[test]
    fn edid_decodes_the_editor_id() {
        let input = wire("EDID", b"IronSword\0");
        let (_, subrecord) = Subrecord::parse(&input, false, false).unwrap();
        match &subrecord {
            Subrecord::Edid(edid) => assert_eq!(edid.editor_id.text, "IronSword"),
            other => panic!("expected EDID, got {:?}", other),
        }
        assert_eq!(subrecord.dump().unwrap(), input);
    }

    #[test]
    fn trdt_parses_every_field() {
        let mut payload = 2u32.to_le_bytes().to_vec();
        payload.extend(50u32.to_le_bytes());
        payload.extend((-1i32).to_le_bytes());
        payload.push(5);
        payload.extend(&[1, 2, 3]);
        payload.extend(0xAB_u32.to_le_bytes());
        payload.push(1);
        payload.extend(&[4, 5, 6]);
        let input = wire("TRDT", &payload);

        let (_, subrecord) = Subrecord::parse(&input, false, false).unwrap();
        match &subrecord {
            Subrecord::Trdt(trdt) => {
                assert_eq!(trdt.emotion_type, 2);
                assert_eq!(trdt.emotion_value, 50);
                assert_eq!(trdt.unknown, -1);
                assert_eq!(trdt.response_id, 5);
                assert_eq!(trdt.junk1, [1, 2, 3]);
                assert_eq!(trdt.sound_file, "000000AB");
                assert_eq!(trdt.use_emo_anim, 1);
                assert_eq!(trdt.junk2, [4, 5, 6]);
            }
            other => panic!("expected TRDT, got {:?}", other),
        }
        assert_eq!(subrecord.dump().unwrap(), input);
    }

    #[test]
    fn string_subrecord_decodes_text_when_not_localized() {
        let input = wire("FULL", b"Iron Sword\0");
        let (_, subrecord) = Subrecord::parse(&input, false, true).unwrap();
        let text = subrecord.as_text().unwrap();
        assert_eq!(text.text(), "Iron Sword");
        assert!(!text.is_localized());
        assert_eq!(subrecord.dump().unwrap(), input);
    }

    #[test]
    fn string_subrecord_decodes_an_id_when_localized() {
        let input = wire("FULL", &0x1234u32.to_le_bytes());
        let (_, subrecord) = Subrecord::parse(&input, true, true).unwrap();
        let text = subrecord.as_text().unwrap();
        assert!(text.is_localized());
        assert_eq!(text.text(), "4660");
        assert_eq!(subrecord.dump().unwrap(), input);
    }

    #[test]
    fn set_string_keeps_the_attached_encoding() {
        let input = wire("FULL", &[0xE9, 0x00]);
        let (_, mut subrecord) = Subrecord::parse(&input, false, true).unwrap();
        let text = subrecord.as_text_mut().unwrap();
        let encoding = match &text.value {
            StringValue::Text(raw) => raw.encoding,
            _ => unreachable!(),
        };
        assert_eq!(encoding, Encoding::Cp1250);

        text.set_string("\u{e1}");
        match &text.value {
            StringValue::Text(raw) => assert_eq!(raw.encoding, encoding),
            _ => unreachable!(),
        }
    }

    #[test]
    fn oversized_captures_the_follower_verbatim() {
        // XXXX declares a 4-byte extended size of 8; the capture then spans
        // the follower's 15 bytes (8 + 7).
        let mut input = wire("XXXX", &8u32.to_le_bytes());
        let follower: Vec<u8> = (0..15).collect();
        input.extend(&follower);

        let (rest, subrecord) = Subrecord::parse(&input, false, false).unwrap();
        assert!(rest.is_empty());
        match &subrecord {
            Subrecord::Oversized(oversized) => {
                assert_eq!(oversized.field_size, 8);
                assert_eq!(oversized.data, follower);
            }
            other => panic!("expected XXXX, got {:?}", other),
        }
        assert_eq!(subrecord.dump().unwrap(), input);
    }

    #[test]
    fn oversized_capture_saturates_at_end_of_input() {
        let mut input = wire("XXXX", &100u32.to_le_bytes());
        input.extend(&[1, 2, 3]);
        let (rest, subrecord) = Subrecord::parse(&input, false, false).unwrap();
        assert!(rest.is_empty());
        assert_eq!(subrecord.dump().unwrap(), input);
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut bytes = b"FULL".to_vec();
        bytes.extend(10u16.to_le_bytes());
        bytes.extend(b"abc");
        assert!(matches!(
            Subrecord::parse(&bytes, false, false),
            Err(Error::TruncatedInput)
        ));
    }
}
