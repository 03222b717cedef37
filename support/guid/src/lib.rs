// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Provides the [`Guid`] type with the same in-memory layout as the UEFI
//! `EFI_GUID` type: a little-endian `u32`, two little-endian `u16`s, and 8
//! raw bytes.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::str::FromStr;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::FromZeros;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Mixed-endian GUID, as stored in firmware images.
#[repr(C)]
#[derive(
    Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, IntoBytes, FromBytes, Immutable, KnownLayout,
)]
#[expect(missing_docs)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

// Default + FromBytes: null-guid is a reasonable return default
impl Default for Guid {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

// These two macros are used to work around the fact that ? can't be used in const fn.
macro_rules! option_helper {
    ($e:expr) => {
        match $e {
            Some(v) => v,
            None => return None,
        }
    };
}

macro_rules! result_helper {
    ($e:expr) => {
        match $e {
            Some(v) => v,
            None => return Err(ParseError::Digit),
        }
    };
}

impl Guid {
    /// Creates a new GUID from a string, panicking if the input is invalid. Accepted formats are
    /// "{00000000-0000-0000-0000-000000000000}" and "00000000-0000-0000-0000-000000000000".
    ///
    /// This is a const function, intended to initialize GUID constants at compile time. For
    /// runtime input, use `from_str` or [`Guid::parse_canonical`].
    pub const fn from_static_str(value: &'static str) -> Guid {
        match Self::parse(value.as_bytes()) {
            Ok(guid) => guid,
            Err(ParseError::Length) => panic!("Invalid GUID length."),
            Err(ParseError::Format) => panic!("Invalid GUID format."),
            Err(ParseError::Digit) => panic!("Invalid GUID digit."),
            Err(ParseError::Version(_)) | Err(ParseError::Variant(_)) => unreachable!(),
        }
    }

    const fn parse(value: &[u8]) -> Result<Self, ParseError> {
        // Slicing is not possible in const fn, so use an index offset.
        let offset = if value.len() == 38 {
            if value[0] != b'{' || value[37] != b'}' {
                return Err(ParseError::Format);
            }

            1
        } else if value.len() == 36 {
            0
        } else {
            return Err(ParseError::Length);
        };

        if value[offset + 8] != b'-'
            || value[offset + 13] != b'-'
            || value[offset + 18] != b'-'
            || value[offset + 23] != b'-'
        {
            return Err(ParseError::Format);
        }

        Ok(Guid {
            data1: result_helper!(u32_from_hex(value, offset)),
            data2: result_helper!(u16_from_hex(value, offset + 9)),
            data3: result_helper!(u16_from_hex(value, offset + 14)),
            data4: [
                result_helper!(u8_from_hex(value, offset + 19)),
                result_helper!(u8_from_hex(value, offset + 21)),
                result_helper!(u8_from_hex(value, offset + 24)),
                result_helper!(u8_from_hex(value, offset + 26)),
                result_helper!(u8_from_hex(value, offset + 28)),
                result_helper!(u8_from_hex(value, offset + 30)),
                result_helper!(u8_from_hex(value, offset + 32)),
                result_helper!(u8_from_hex(value, offset + 34)),
            ],
        })
    }

    /// Parses operator-supplied GUID text.
    ///
    /// Only the unbraced 8-4-4-4-12 form is accepted (in either case), and
    /// the value must follow the RFC 4122 layout: a version nibble of 1
    /// through 5 and a variant nibble of 8, 9, a or b.
    pub fn parse_canonical(s: &str) -> Result<Self, ParseError> {
        if s.len() != 36 {
            return Err(ParseError::Length);
        }
        let guid = Self::parse(s.as_bytes())?;
        let version = (guid.data3 >> 12) as u8;
        if !(1..=5).contains(&version) {
            return Err(ParseError::Version(version));
        }
        let variant = guid.data4[0] >> 4;
        if !(0x8..=0xb).contains(&variant) {
            return Err(ParseError::Variant(variant));
        }
        Ok(guid)
    }

    /// The all-zero GUID.
    pub const ZERO: Self = Self::from_static_str("00000000-0000-0000-0000-000000000000");

    /// Returns true if this is the all-zero GUID.
    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }
}

impl std::fmt::Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7],
        )
    }
}

impl std::fmt::Debug for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// An error parsing a GUID.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The text is neither 36 nor 38 characters long.
    #[error("invalid GUID length")]
    Length,
    /// Braces or hyphens are missing or misplaced.
    #[error("invalid GUID format")]
    Format,
    /// A group contains a non-hex character.
    #[error("invalid GUID digit")]
    Digit,
    /// The version nibble is outside 1 through 5.
    #[error("invalid GUID version nibble {0:#x}")]
    Version(u8),
    /// The variant nibble is outside 8 through b.
    #[error("invalid GUID variant nibble {0:#x}")]
    Variant(u8),
}

const fn char_to_hex(value: u8) -> Option<u8> {
    Some(match value {
        b'0'..=b'9' => value - b'0',
        b'a'..=b'f' => 10 + value - b'a',
        b'A'..=b'F' => 10 + value - b'A',
        _ => return None,
    })
}

const fn u8_from_hex(input: &[u8], index: usize) -> Option<u8> {
    Some(
        option_helper!(char_to_hex(input[index])) << 4
            | option_helper!(char_to_hex(input[index + 1])),
    )
}

const fn u16_from_hex(input: &[u8], index: usize) -> Option<u16> {
    Some(
        (option_helper!(u8_from_hex(input, index)) as u16) << 8
            | (option_helper!(u8_from_hex(input, index + 2)) as u16),
    )
}

const fn u32_from_hex(input: &[u8], index: usize) -> Option<u32> {
    Some(
        (option_helper!(u16_from_hex(input, index)) as u32) << 16
            | (option_helper!(u16_from_hex(input, index + 4)) as u32),
    )
}

impl FromStr for Guid {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.as_bytes())
    }
}

impl TryFrom<&[u8]> for Guid {
    type Error = ParseError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Guid::parse(value)
    }
}

impl From<Guid> for [u8; 16] {
    fn from(value: Guid) -> Self {
        zerocopy::transmute!(value)
    }
}
