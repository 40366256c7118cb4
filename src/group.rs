//! Group codec: the recursive `GRUP` container and its type-dependent
//! label encoding.

use crate::error::{Error, Result};
use crate::primitives::{
    dump_hex, read_bytes, read_hex, read_i16, read_i32, read_tag, read_u16, read_u32, Parsed,
};
use crate::record::{Record, RecordFlags};
use crate::string_records::StringRecords;

const GROUP_HEADER_SIZE: u32 = 24;

/// The ten group container kinds of the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupType {
    Normal = 0,
    WorldChildren = 1,
    InteriorCellBlock = 2,
    InteriorCellSubBlock = 3,
    ExteriorCellBlock = 4,
    ExteriorCellSubBlock = 5,
    CellChildren = 6,
    TopicChildren = 7,
    CellPersistentChildren = 8,
    CellTemporaryChildren = 9,
}

impl GroupType {
    fn from_raw(value: i32) -> Result<GroupType> {
        Ok(match value {
            0 => GroupType::Normal,
            1 => GroupType::WorldChildren,
            2 => GroupType::InteriorCellBlock,
            3 => GroupType::InteriorCellSubBlock,
            4 => GroupType::ExteriorCellBlock,
            5 => GroupType::ExteriorCellSubBlock,
            6 => GroupType::CellChildren,
            7 => GroupType::TopicChildren,
            8 => GroupType::CellPersistentChildren,
            9 => GroupType::CellTemporaryChildren,
            _ => return Err(Error::UnknownGroupType(value)),
        })
    }
}

/// The group label, decoded according to the group type.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupLabel {
    /// Contained record type of a top-level group.
    RecordType(String),
    /// Hex form id of the parent world or dialogue topic.
    FormId(String),
    BlockNumber(i32),
    SubBlockNumber(i32),
    GridCoords(i16, i16),
    /// Hex form id of the parent cell.
    ParentCell(String),
}

impl GroupLabel {
    fn decode(group_type: GroupType, bytes: &[u8]) -> Result<GroupLabel> {
        Ok(match group_type {
            GroupType::Normal => match std::str::from_utf8(bytes) {
                Ok(label) => GroupLabel::RecordType(label.to_owned()),
                Err(_) => return Err(Error::MalformedTag(bytes.to_vec())),
            },
            GroupType::WorldChildren | GroupType::TopicChildren => {
                GroupLabel::FormId(read_hex(bytes)?.1)
            }
            GroupType::InteriorCellBlock => GroupLabel::BlockNumber(read_i32(bytes)?.1),
            GroupType::InteriorCellSubBlock => GroupLabel::SubBlockNumber(read_i32(bytes)?.1),
            GroupType::ExteriorCellBlock | GroupType::ExteriorCellSubBlock => {
                let (rest, y) = read_i16(bytes)?;
                let (_, x) = read_i16(rest)?;
                GroupLabel::GridCoords(y, x)
            }
            GroupType::CellChildren
            | GroupType::CellPersistentChildren
            | GroupType::CellTemporaryChildren => GroupLabel::ParentCell(read_hex(bytes)?.1),
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(match self {
            GroupLabel::RecordType(label) => label.as_bytes().to_vec(),
            GroupLabel::FormId(form_id) | GroupLabel::ParentCell(form_id) => dump_hex(form_id)?,
            GroupLabel::BlockNumber(number) | GroupLabel::SubBlockNumber(number) => {
                number.to_le_bytes().to_vec()
            }
            GroupLabel::GridCoords(y, x) => {
                let mut bytes = y.to_le_bytes().to_vec();
                bytes.extend(x.to_le_bytes());
                bytes
            }
        })
    }
}

/// A child of a group: either a record or a nested group.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupChild {
    Group(Group),
    Record(Record),
}

/// One parsed `GRUP` container.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub size: u32,
    pub label: GroupLabel,
    pub group_type: GroupType,
    pub timestamp: u16,
    pub version_control_info: u16,
    pub unknown: u32,
    pub children: Vec<GroupChild>,
}

impl Group {
    pub fn parse<'a>(
        input: &'a [u8],
        header_flags: RecordFlags,
        table: &StringRecords,
    ) -> Parsed<'a, Group> {
        let (input, tag) = read_tag(input)?;
        if tag != "GRUP" {
            return Err(Error::MalformedTag(tag.into_bytes()));
        }
        let (input, size) = read_u32(input)?;
        let (input, label_bytes) = read_bytes(input, 4)?;
        let (input, group_type_raw) = read_i32(input)?;
        let (input, timestamp) = read_u16(input)?;
        let (input, version_control_info) = read_u16(input)?;
        let (input, unknown) = read_u32(input)?;
        if size < GROUP_HEADER_SIZE {
            return Err(Error::TruncatedInput);
        }
        let (input, payload) = read_bytes(input, (size - GROUP_HEADER_SIZE) as usize)?;

        let group_type = GroupType::from_raw(group_type_raw)?;
        let label = GroupLabel::decode(group_type, label_bytes)?;

        let mut children = Vec::new();
        let mut payload = payload;
        while !payload.is_empty() {
            if payload.get(..4) == Some(&b"GRUP"[..]) {
                let (rest, child) = Group::parse(payload, header_flags, table)?;
                children.push(GroupChild::Group(child));
                payload = rest;
            } else {
                let (rest, child) = Record::parse(payload, header_flags, table)?;
                children.push(GroupChild::Record(child));
                payload = rest;
            }
        }

        Ok((
            input,
            Group {
                size,
                label,
                group_type,
                timestamp,
                version_control_info,
                unknown,
                children,
            },
        ))
    }

    pub fn dump(&self) -> Result<Vec<u8>> {
        let mut child_data = Vec::new();
        for child in &self.children {
            match child {
                GroupChild::Group(group) => child_data.extend(group.dump()?),
                GroupChild::Record(record) => child_data.extend(record.dump()?),
            }
        }

        let mut data = b"GRUP".to_vec();
        data.extend((child_data.len() as u32 + GROUP_HEADER_SIZE).to_le_bytes());
        data.extend(self.label.encode()?);
        data.extend((self.group_type as i32).to_le_bytes());
        data.extend(self.timestamp.to_le_bytes());
        data.extend(self.version_control_info.to_le_bytes());
        data.extend(self.unknown.to_le_bytes());
        data.extend(child_data);
        Ok(data)
    }
}
