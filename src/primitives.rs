//! Primitive codec: little-endian integers and floats, hex-formatted
//! identifiers and the string wire variants used by subrecord payloads.

use std::str;

use encoding_rs::{WINDOWS_1250, WINDOWS_1251, WINDOWS_1252};
use nom::bytes::complete::take;
use nom::number::complete::{le_f32, le_f64, le_i16, le_i32, le_u16, le_u32, le_u64, le_u8};
use nom::IResult;

use crate::error::{Error, Result};

/// Parse result threading the remaining input the way the nom combinators
/// do, but carrying the crate error type.
pub type Parsed<'a, T> = Result<(&'a [u8], T)>;

fn complete<'a, T>(result: IResult<&'a [u8], T>) -> Parsed<'a, T> {
    result.map_err(|_| Error::TruncatedInput)
}

pub fn read_u8(input: &[u8]) -> Parsed<u8> {
    complete(le_u8(input))
}

pub fn read_u16(input: &[u8]) -> Parsed<u16> {
    complete(le_u16(input))
}

pub fn read_i16(input: &[u8]) -> Parsed<i16> {
    complete(le_i16(input))
}

pub fn read_u32(input: &[u8]) -> Parsed<u32> {
    complete(le_u32(input))
}

pub fn read_i32(input: &[u8]) -> Parsed<i32> {
    complete(le_i32(input))
}

pub fn read_u64(input: &[u8]) -> Parsed<u64> {
    complete(le_u64(input))
}

pub fn read_f32(input: &[u8]) -> Parsed<f32> {
    complete(le_f32(input))
}

pub fn read_f64(input: &[u8]) -> Parsed<f64> {
    complete(le_f64(input))
}

pub fn read_bytes(input: &[u8], count: usize) -> Parsed<&[u8]> {
    complete(take(count)(input))
}

/// Reads a 4-byte record/subrecord/group tag.
pub fn read_tag(input: &[u8]) -> Parsed<String> {
    let (rest, bytes) = read_bytes(input, 4)?;
    match str::from_utf8(bytes) {
        Ok(tag) => Ok((rest, tag.to_owned())),
        Err(_) => Err(Error::MalformedTag(bytes.to_vec())),
    }
}

/// Peeks at the next 4 bytes without consuming them.
pub fn peek_tag(input: &[u8]) -> Option<&str> {
    input.get(..4).and_then(|bytes| str::from_utf8(bytes).ok())
}

/// Reads `size` bytes as a little-endian unsigned integer and renders it as
/// an uppercase hex string zero-padded to `2 * size` characters.
pub fn read_hex_sized(input: &[u8], size: usize) -> Parsed<String> {
    let (rest, bytes) = read_bytes(input, size)?;
    let mut value: u64 = 0;
    for (i, &byte) in bytes.iter().enumerate().take(8) {
        value |= u64::from(byte) << (8 * i);
    }
    Ok((rest, format!("{:0width$X}", value, width = size * 2)))
}

/// Reads a 4-byte hex identifier (the FormID width).
pub fn read_hex(input: &[u8]) -> Parsed<String> {
    read_hex_sized(input, 4)
}

/// Emits a hex identifier back as `size` little-endian bytes.
pub fn dump_hex_sized(value: &str, size: usize) -> Result<Vec<u8>> {
    let number =
        u64::from_str_radix(value, 16).map_err(|_| Error::InvalidHex(value.to_owned()))?;
    if size < 8 && number >> (8 * size) != 0 {
        return Err(Error::InvalidHex(value.to_owned()));
    }
    Ok(number.to_le_bytes()[..size.min(8)].to_vec())
}

pub fn dump_hex(value: &str) -> Result<Vec<u8>> {
    dump_hex_sized(value, 4)
}

/// Text encodings a plugin string may be stored in, tried in the order the
/// game's localization tooling expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Cp1250,
    Cp1252,
    Cp1251,
}

impl Encoding {
    /// Decode attempt order; utf-8 first so plain ASCII stays utf-8.
    pub const PREFERENCE: [Encoding; 4] = [
        Encoding::Utf8,
        Encoding::Cp1250,
        Encoding::Cp1252,
        Encoding::Cp1251,
    ];

    fn table(self) -> Option<&'static encoding_rs::Encoding> {
        match self {
            Encoding::Utf8 => None,
            Encoding::Cp1250 => Some(WINDOWS_1250),
            Encoding::Cp1252 => Some(WINDOWS_1252),
            Encoding::Cp1251 => Some(WINDOWS_1251),
        }
    }

    fn decode(self, bytes: &[u8]) -> Option<String> {
        match self.table() {
            None => str::from_utf8(bytes).ok().map(str::to_owned),
            Some(table) => {
                let (text, had_errors) = table.decode_without_bom_handling(bytes);
                // The WHATWG tables fill bytes the Windows code pages leave
                // undefined with C1 controls instead of reporting an error;
                // plugin text never contains those, so count them as a
                // failed decode.
                if had_errors || text.chars().any(|c| ('\u{80}'..='\u{9f}').contains(&c)) {
                    None
                } else {
                    Some(text.into_owned())
                }
            }
        }
    }

    fn encode(self, text: &str) -> Option<Vec<u8>> {
        match self.table() {
            None => Some(text.as_bytes().to_vec()),
            Some(table) => {
                let (bytes, _, had_errors) = table.encode(text);
                if had_errors {
                    None
                } else {
                    Some(bytes.into_owned())
                }
            }
        }
    }
}

/// A decoded string with its source encoding attached, so that re-emitting
/// an unmodified value reproduces the original bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawString {
    pub text: String,
    pub encoding: Encoding,
}

impl RawString {
    /// Builds a string from text, attaching the first encoding (preferred
    /// one first) that can represent it. This keeps [`RawString::encode`]
    /// total: the attached encoding always round-trips the text.
    pub fn from_str(text: impl Into<String>, preferred: Encoding) -> RawString {
        let text = text.into();
        if preferred.encode(&text).is_some() {
            return RawString {
                text,
                encoding: preferred,
            };
        }
        for &encoding in &Encoding::PREFERENCE {
            if encoding != preferred && encoding.encode(&text).is_some() {
                return RawString { text, encoding };
            }
        }
        RawString {
            text,
            encoding: Encoding::Utf8,
        }
    }

    /// Decodes bytes, trying each supported encoding in preference order.
    /// Never fails: lossy utf-8 is the last resort.
    pub fn decode(bytes: &[u8]) -> RawString {
        for &encoding in &Encoding::PREFERENCE {
            if let Some(text) = encoding.decode(bytes) {
                return RawString { text, encoding };
            }
        }
        RawString {
            text: String::from_utf8_lossy(bytes).into_owned(),
            encoding: Encoding::Utf8,
        }
    }

    /// Re-encodes the text, trying the attached encoding first and falling
    /// through the preference order, with lossy utf-8 as the last resort.
    pub fn encode(&self) -> Vec<u8> {
        if let Some(bytes) = self.encoding.encode(&self.text) {
            return bytes;
        }
        for &encoding in &Encoding::PREFERENCE {
            if encoding != self.encoding {
                if let Some(bytes) = encoding.encode(&self.text) {
                    return bytes;
                }
            }
        }
        self.text.as_bytes().to_vec()
    }
}

fn trim_nuls(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| b != 0).map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Reads a NUL-terminated string; an unterminated tail is consumed whole.
pub fn read_zstring(input: &[u8]) -> (&[u8], RawString) {
    let end = input.iter().position(|&b| b == 0).unwrap_or(input.len());
    let value = RawString::decode(&input[..end]);
    let rest = if end < input.len() {
        &input[end + 1..]
    } else {
        &input[end..]
    };
    (rest, value)
}

pub fn dump_zstring(value: &RawString) -> Vec<u8> {
    let mut bytes = value.encode();
    bytes.push(0);
    bytes
}

/// Reads a single raw char (1 byte).
pub fn read_char(input: &[u8]) -> Parsed<[u8; 1]> {
    let (rest, bytes) = read_bytes(input, 1)?;
    Ok((rest, [bytes[0]]))
}

/// Reads a single raw wide char (2 bytes).
pub fn read_wchar(input: &[u8]) -> Parsed<[u8; 2]> {
    let (rest, bytes) = read_bytes(input, 2)?;
    Ok((rest, [bytes[0], bytes[1]]))
}

/// Reads a string with a 1-byte length prefix. Handles both the plain and
/// the NUL-terminated layout, since trailing NULs are stripped either way.
pub fn read_bstring(input: &[u8]) -> Parsed<RawString> {
    let (input, size) = read_u8(input)?;
    let (input, bytes) = read_bytes(input, size as usize)?;
    Ok((input, RawString::decode(trim_nuls(bytes))))
}

pub fn dump_bstring(value: &RawString) -> Vec<u8> {
    let text = value.encode();
    let mut bytes = vec![text.len() as u8];
    bytes.extend(text);
    bytes
}

/// Like [`dump_bstring`] but the terminator is included in the length.
pub fn dump_bzstring(value: &RawString) -> Vec<u8> {
    let mut text = value.encode();
    text.push(0);
    let mut bytes = vec![text.len() as u8];
    bytes.extend(text);
    bytes
}

/// Reads a string with a 2-byte length prefix.
pub fn read_wstring(input: &[u8]) -> Parsed<RawString> {
    let (input, size) = read_u16(input)?;
    let (input, bytes) = read_bytes(input, size as usize)?;
    Ok((input, RawString::decode(trim_nuls(bytes))))
}

pub fn dump_wstring(value: &RawString) -> Vec<u8> {
    let text = value.encode();
    let mut bytes = (text.len() as u16).to_le_bytes().to_vec();
    bytes.extend(text);
    bytes
}

/// Like [`dump_wstring`] but the terminator is included in the length.
pub fn dump_wzstring(value: &RawString) -> Vec<u8> {
    let mut text = value.encode();
    text.push(0);
    let mut bytes = (text.len() as u16).to_le_bytes().to_vec();
    bytes.extend(text);
    bytes
}

/// Reads a fixed-size string whose length comes from an outer size field.
pub fn read_sized_string(input: &[u8], size: usize) -> Parsed<RawString> {
    let (input, bytes) = read_bytes(input, size)?;
    Ok((input, RawString::decode(bytes)))
}

/// Reads `count` NUL-separated strings; empty items are skipped.
pub fn read_string_list(mut input: &[u8], count: usize) -> Parsed<Vec<RawString>> {
    let mut items = Vec::new();
    while items.len() < count {
        if input.is_empty() {
            return Err(Error::TruncatedInput);
        }
        let (rest, item) = read_zstring(input);
        input = rest;
        if !item.text.is_empty() {
            items.push(item);
        }
    }
    Ok((input, items))
}

pub fn dump_string_list(items: &[RawString]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            bytes.push(0);
        }
        bytes.extend(item.encode());
    }
    bytes.push(0);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips_bytes() {
        let bytes = [0x00, 0x08, 0x00, 0x00];
        let (rest, hex) = read_hex(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(hex, "00000800");
        assert_eq!(dump_hex(&hex).unwrap(), bytes);
    }

    #[test]
    fn hex_round_trips_strings() {
        let hex = "FE00123A";
        let bytes = dump_hex(hex).unwrap();
        let (_, parsed) = read_hex(&bytes).unwrap();
        assert_eq!(parsed, hex);
    }

    #[test]
    fn hex_rejects_garbage() {
        assert!(matches!(dump_hex("zzzz"), Err(Error::InvalidHex(_))));
        assert!(matches!(
            dump_hex_sized("1FF", 1),
            Err(Error::InvalidHex(_))
        ));
    }

    #[test]
    fn decode_prefers_utf8_for_ascii() {
        let value = RawString::decode(b"Iron Sword");
        assert_eq!(value.text, "Iron Sword");
        assert_eq!(value.encoding, Encoding::Utf8);
    }

    #[test]
    fn decode_falls_through_the_encoding_list() {
        // 0xE9 is invalid utf-8 on its own and lands on cp1250
        let value = RawString::decode(&[0xE9]);
        assert_eq!(value.text, "\u{e9}");
        assert_eq!(value.encoding, Encoding::Cp1250);

        // 0x98 is unmapped in cp1250 but valid in cp1252
        let value = RawString::decode(&[0x98]);
        assert_eq!(value.text, "\u{2dc}");
        assert_eq!(value.encoding, Encoding::Cp1252);

        // 0x90 is unmapped in cp1250 and cp1252 but valid in cp1251
        let value = RawString::decode(&[0x90]);
        assert_eq!(value.text, "\u{452}");
        assert_eq!(value.encoding, Encoding::Cp1251);
    }

    #[test]
    fn encode_preserves_the_attached_encoding() {
        let value = RawString::from_str("\u{e9}", Encoding::Cp1252);
        assert_eq!(value.encoding, Encoding::Cp1252);
        assert_eq!(value.encode(), vec![0xE9]);
    }

    #[test]
    fn encode_falls_back_when_the_encoding_cannot_hold_the_text() {
        let value = RawString::from_str("\u{94c1}\u{5251}", Encoding::Cp1252);
        assert_eq!(value.encoding, Encoding::Utf8);
        assert_eq!(value.encode(), "\u{94c1}\u{5251}".as_bytes());
    }

    #[test]
    fn decoded_bytes_reencode_identically() {
        let bytes = [0xE9, 0x20, 0x41];
        let value = RawString::decode(&bytes);
        assert_eq!(value.encode(), bytes);
    }

    #[test]
    fn zstring_consumes_the_terminator() {
        let (rest, value) = read_zstring(b"abc\0def");
        assert_eq!(value.text, "abc");
        assert_eq!(rest, b"def");
    }

    #[test]
    fn zstring_accepts_an_unterminated_tail() {
        let (rest, value) = read_zstring(b"abc");
        assert_eq!(value.text, "abc");
        assert!(rest.is_empty());
    }

    #[test]
    fn bstring_round_trips() {
        let value = RawString::from_str("abc", Encoding::Utf8);
        let bytes = dump_bstring(&value);
        assert_eq!(bytes, b"\x03abc");
        let (rest, parsed) = read_bstring(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.text, "abc");
    }

    #[test]
    fn bzstring_length_includes_the_terminator() {
        let value = RawString::from_str("abc", Encoding::Utf8);
        let bytes = dump_bzstring(&value);
        assert_eq!(bytes, b"\x04abc\0");
        let (rest, parsed) = read_bstring(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.text, "abc");
    }

    #[test]
    fn wstring_round_trips() {
        let value = RawString::from_str("abc", Encoding::Utf8);
        let bytes = dump_wstring(&value);
        assert_eq!(bytes, b"\x03\x00abc");
        let (_, parsed) = read_wstring(&bytes).unwrap();
        assert_eq!(parsed.text, "abc");

        let bytes = dump_wzstring(&value);
        assert_eq!(bytes, b"\x04\x00abc\0");
        let (_, parsed) = read_wstring(&bytes).unwrap();
        assert_eq!(parsed.text, "abc");
    }

    #[test]
    fn prefixed_string_errors_on_truncated_input() {
        assert!(matches!(
            read_bstring(b"\x10ab"),
            Err(Error::TruncatedInput)
        ));
        assert!(matches!(
            read_wstring(b"\x10\x00ab"),
            Err(Error::TruncatedInput)
        ));
    }

    #[test]
    fn string_list_round_trips() {
        let bytes = b"one\0two\0three\0";
        let (rest, items) = read_string_list(bytes, 3).unwrap();
        assert!(rest.is_empty());
        let texts: Vec<&str> = items.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert_eq!(dump_string_list(&items), bytes);
    }

    #[test]
    fn string_list_errors_when_items_run_out() {
        assert!(matches!(
            read_string_list(b"one\0", 2),
            Err(Error::TruncatedInput)
        ));
    }

    #[test]
    fn tag_must_be_utf8() {
        assert!(matches!(
            read_tag(&[0xFF, 0xFE, 0x00, 0x41]),
            Err(Error::MalformedTag(_))
        ));
        let (_, tag) = read_tag(b"WEAPrest").unwrap();
        assert_eq!(tag, "WEAP");
    }
}
