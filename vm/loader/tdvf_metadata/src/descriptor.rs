// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The TDVF metadata descriptor table.

#![allow(non_camel_case_types)]

use crate::Error;
use bitfield_struct::bitfield;
use static_assertions::const_assert_eq;
use std::fmt;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Tag at the start of the descriptor table.
pub const TDVF_SIGNATURE: [u8; 4] = *b"TDVF";

/// The only descriptor version.
pub const TDVF_DESCRIPTOR_VERSION: u32 = 1;

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct TDVF_DESCRIPTOR {
    pub signature: [u8; 4],
    /// Size of the header plus all section entries.
    pub length: u32,
    pub version: u32,
    pub number_of_section_entry: u32,
    // TDVF_SECTION SectionEntries[];
}

const_assert_eq!(size_of::<TDVF_DESCRIPTOR>(), 16);

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct TDVF_SECTION {
    /// Offset of the section's contents in the image.
    pub data_offset: u32,
    pub raw_data_size: u32,
    /// Guest physical address the section is mapped at.
    pub memory_address: u64,
    pub memory_data_size: u64,
    pub section_type: u32,
    pub attributes: u32,
}

const_assert_eq!(size_of::<TDVF_SECTION>(), 32);

/// What a section holds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SectionType {
    /// Boot firmware volume.
    Bfv,
    /// Configuration firmware volume.
    Cfv,
    /// TD HOB list.
    TdHob,
    /// Temporary memory.
    TempMem,
    /// Reserved, also used for any unrecognized type.
    Reserved,
}

impl SectionType {
    /// Decode a raw type. Unknown values become [`SectionType::Reserved`].
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Bfv,
            1 => Self::Cfv,
            2 => Self::TdHob,
            3 => Self::TempMem,
            _ => Self::Reserved,
        }
    }

    /// The raw type value.
    pub fn raw(self) -> u32 {
        match self {
            Self::Bfv => 0,
            Self::Cfv => 1,
            Self::TdHob => 2,
            Self::TempMem => 3,
            Self::Reserved => 4,
        }
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bfv => "BFV",
            Self::Cfv => "CFV",
            Self::TdHob => "TD_HOB",
            Self::TempMem => "TempMem",
            Self::Reserved => "Reserved",
        }
    }
}

/// Section attributes.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct SectionAttributes {
    /// Measure the section into the TD's runtime measurement register.
    pub extend_mr: bool,
    #[bits(31)]
    _reserved: u32,
}

/// One decoded section entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub data_offset: u32,
    pub raw_data_size: u32,
    pub memory_address: u64,
    pub memory_data_size: u64,
    pub section_type: SectionType,
    pub attributes: SectionAttributes,
}

impl From<TDVF_SECTION> for Section {
    fn from(raw: TDVF_SECTION) -> Self {
        Self {
            data_offset: raw.data_offset,
            raw_data_size: raw.raw_data_size,
            memory_address: raw.memory_address,
            memory_data_size: raw.memory_data_size,
            section_type: SectionType::from_raw(raw.section_type),
            attributes: raw.attributes.into(),
        }
    }
}

impl From<&Section> for TDVF_SECTION {
    fn from(section: &Section) -> Self {
        Self {
            data_offset: section.data_offset,
            raw_data_size: section.raw_data_size,
            memory_address: section.memory_address,
            memory_data_size: section.memory_data_size,
            section_type: section.section_type.raw(),
            attributes: section.attributes.into(),
        }
    }
}

/// A decoded descriptor table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorTable {
    /// Length recorded in the header.
    pub length: u32,
    pub version: u32,
    pub sections: Vec<Section>,
}

impl DescriptorTable {
    /// A version 1 table holding `sections`.
    pub fn new(sections: Vec<Section>) -> Self {
        let length = size_of::<TDVF_DESCRIPTOR>() + sections.len() * size_of::<TDVF_SECTION>();
        Self {
            length: length as u32,
            version: TDVF_DESCRIPTOR_VERSION,
            sections,
        }
    }

    /// Decode the table at the start of `data`. `offset` is only used for
    /// error reporting.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self, Error> {
        let (header, mut rest) = TDVF_DESCRIPTOR::read_from_prefix(data)
            .map_err(|_| Error::InvalidDescriptor { offset })?;
        if header.signature != TDVF_SIGNATURE {
            return Err(Error::InvalidDescriptor { offset });
        }

        let mut sections = Vec::new();
        for _ in 0..header.number_of_section_entry {
            let (section, next) = TDVF_SECTION::read_from_prefix(rest).map_err(|_| {
                Error::TruncatedSectionTable {
                    offset,
                    count: header.number_of_section_entry,
                }
            })?;
            sections.push(section.into());
            rest = next;
        }

        Ok(Self {
            length: header.length,
            version: header.version,
            sections,
        })
    }

    /// Encode the header and section entries.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = TDVF_DESCRIPTOR {
            signature: TDVF_SIGNATURE,
            length: self.length,
            version: self.version,
            number_of_section_entry: self.sections.len() as u32,
        }
        .as_bytes()
        .to_vec();
        for section in &self.sections {
            out.extend_from_slice(TDVF_SECTION::from(section).as_bytes());
        }
        out
    }
}

impl fmt::Display for DescriptorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Signature             : TDVF")?;
        writeln!(f, "Length                : {}", self.length)?;
        writeln!(f, "Version               : {}", self.version)?;
        writeln!(f, "NumberOfSectionEntry  : {}", self.sections.len())?;
        writeln!(f, "Sections              :")?;
        for s in &self.sections {
            writeln!(
                f,
                " base: {:#010x}, len: {:#010x}, type: {:#010x}, attr: {:#010x}, raw_offset: {:#010x}, size: {:#010x} <-- {}",
                s.memory_address,
                s.memory_data_size,
                s.section_type.raw(),
                u32::from(s.attributes),
                s.data_offset,
                s.raw_data_size,
                s.section_type.name(),
            )?;
        }
        Ok(())
    }
}
