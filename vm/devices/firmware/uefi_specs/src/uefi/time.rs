// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! UEFI Time Services.

use bitfield_struct::bitfield;
use core::fmt::Display;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::FromZeros;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// UEFI Time Structure
///
/// UEFI spec 8.3 - Time Services
///
/// Authenticated variable timestamps always use the zero timezone with
/// `pad1`, `nanosecond`, `daylight` and `pad2` cleared.
#[repr(C)]
#[derive(Copy, Clone, Debug, IntoBytes, FromBytes, Immutable, KnownLayout, PartialEq, Eq)]
pub struct EFI_TIME {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub pad1: u8,
    pub nanosecond: u32,
    pub timezone: EfiTimezone,
    pub daylight: EfiDaylight,
    pub pad2: u8,
}

// Default + FromBytes: The UEFI spec explicitly uses all-zero EFI_TIME as a
// default value
impl Default for EFI_TIME {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

const_assert_eq!(size_of::<EFI_TIME>(), 16);

impl EFI_TIME {
    /// EFI_TIME with all fields set to zero
    pub const ZEROED: EFI_TIME = EFI_TIME::new_utc(0, 0, 0, 0, 0, 0);

    /// A GMT timestamp with one-second resolution, in the form expected by
    /// `EFI_VARIABLE_AUTHENTICATION_2`.
    pub const fn new_utc(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        EFI_TIME {
            year,
            month,
            day,
            hour,
            minute,
            second,
            pad1: 0,
            nanosecond: 0,
            timezone: EfiTimezone(0),
            daylight: EfiDaylight::new(),
            pad2: 0,
        }
    }

    /// Returns true if every byte of the timestamp is zero.
    pub fn is_zeroed(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }
}

impl Display for EFI_TIME {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // ISO-8601: 2022-02-17T04:54:13Z
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;
        if self.nanosecond != 0 {
            write!(f, ".{:09}", self.nanosecond)?;
        }
        if self.timezone.0 == 0 {
            write!(f, "Z")?;
        } else if self.timezone != EFI_UNSPECIFIED_TIMEZONE {
            let sign = if self.timezone.0 > 0 { '+' } else { '-' };
            let timezone = (self.timezone.0 as i32).abs();
            write!(f, "{sign}{:02}:{:02}", timezone / 60, timezone % 60)?;
        }
        Ok(())
    }
}

/// Value Definition for EFI_TIME.TimeZone
/// from UEFI spec 8.3 - Time Services
pub const EFI_UNSPECIFIED_TIMEZONE: EfiTimezone = EfiTimezone(0x07FF);

/// Timezone in minutes from UTC
#[derive(Copy, Clone, Debug, IntoBytes, FromBytes, Immutable, KnownLayout, PartialEq, Eq)]
#[repr(transparent)]
pub struct EfiTimezone(pub i16);

/// Bit Definitions for EFI_TIME.EfiDaylight
/// from UEFI spec 8.3 - Time Services
#[bitfield(u8)]
#[derive(IntoBytes, FromBytes, Immutable, KnownLayout, PartialEq, Eq)]
pub struct EfiDaylight {
    /// EFI_TIME_ADJUST_DAYLIGHT
    pub adjust_daylight: bool,
    /// EFI_TIME_IN_DAYLIGHT
    pub in_daylight: bool,
    #[bits(6)]
    _rsvd: u8,
}
