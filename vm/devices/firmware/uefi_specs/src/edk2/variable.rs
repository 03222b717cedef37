// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! EDK2 `MdeModulePkg/Include/Guid/VariableFormat.h`
//!
//! A variable store lives directly after the header of the
//! [`EFI_SYSTEM_NV_DATA_FV_GUID`](crate::pi::firmware_volume::EFI_SYSTEM_NV_DATA_FV_GUID)
//! firmware volume. Its signature GUID selects the record layout; only the
//! time-based authenticated layout is described here.

use crate::uefi::time::EFI_TIME;
use guid::Guid;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::LittleEndian;
use zerocopy::U64;

/// `gEfiVariableGuid`: records use the plain `VARIABLE_HEADER`.
pub const EFI_VARIABLE_GUID: Guid = Guid::from_static_str("ddcf3616-3275-4164-98b6-fe85707ffe7d");

/// `gEfiAuthenticatedVariableGuid`: counter-based authenticated records.
pub const EFI_AUTHENTICATED_VARIABLE_GUID: Guid =
    Guid::from_static_str("515fa686-b06e-4550-9112-382bf1067bfb");

/// `gEfiAuthenticatedVariableBasedTimeGuid`: records use
/// [`AUTHENTICATED_VARIABLE_HEADER`].
pub const EFI_AUTHENTICATED_VARIABLE_BASED_TIME_GUID: Guid =
    Guid::from_static_str("aaf32c78-947b-439a-a180-2e144ec37792");

/// `VARIABLE_STORE_FORMATTED`
pub const VARIABLE_STORE_FORMATTED: u8 = 0x5a;
/// `VARIABLE_STORE_HEALTHY`
pub const VARIABLE_STORE_HEALTHY: u8 = 0xfe;

/// Every record begins with this marker.
pub const VARIABLE_DATA: u16 = 0x55aa;

/// Records start on this boundary, relative to the end of the store header.
pub const HEADER_ALIGNMENT: usize = 4;

// Variable states. Bits are cleared in flash as a record goes through its
// lifecycle, so a live record is `VAR_ADDED` with every other bit still set.
pub const VAR_IN_DELETED_TRANSITION: u8 = 0xfe;
pub const VAR_DELETED: u8 = 0xfd;
pub const VAR_HEADER_VALID_ONLY: u8 = 0x7f;
pub const VAR_ADDED: u8 = 0x3f;

/// `VARIABLE_STORE_HEADER`
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct VARIABLE_STORE_HEADER {
    pub signature: Guid,
    /// Size of the store, including this header.
    pub size: u32,
    pub format: u8,
    pub state: u8,
    pub reserved: u16,
    pub reserved1: u32,
}

const_assert_eq!(size_of::<VARIABLE_STORE_HEADER>(), 28);

/// `AUTHENTICATED_VARIABLE_HEADER`
///
/// Followed by `name_size` bytes of NUL terminated UCS-2 name and
/// `data_size` bytes of data. The next record starts at the following
/// [`HEADER_ALIGNMENT`] boundary.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct AUTHENTICATED_VARIABLE_HEADER {
    pub start_id: u16,
    pub state: u8,
    pub reserved: u8,
    pub attributes: u32,
    pub monotonic_count: U64<LittleEndian>,
    pub timestamp: EFI_TIME,
    pub pubkey_index: u32,
    pub name_size: u32,
    pub data_size: u32,
    pub vendor_guid: Guid,
}

const_assert_eq!(size_of::<AUTHENTICATED_VARIABLE_HEADER>(), 60);
