// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! PI spec Vol 3, 3.2.1 - Firmware Volume Header

use guid::Guid;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

const fn signature_32(v: &[u8; 4]) -> u32 {
    v[0] as u32 | (v[1] as u32) << 8 | (v[2] as u32) << 16 | (v[3] as u32) << 24
}

/// `_FVH`, as a little-endian `u32`.
pub const EFI_FVH_SIGNATURE: u32 = signature_32(b"_FVH");

/// The fixed portion of a firmware volume header. A variable length block
/// map follows it, and `header_length` covers both.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct EFI_FIRMWARE_VOLUME_HEADER {
    pub zero_vector: [u8; 16],
    pub file_system_guid: Guid,
    pub fv_length: u64,
    pub signature: u32,
    pub attributes: u32,
    pub header_length: u16,
    pub checksum: u16,
    pub ext_header_offset: u16,
    pub reserved: u8,
    pub revision: u8,
}

const_assert_eq!(size_of::<EFI_FIRMWARE_VOLUME_HEADER>(), 0x38);

/// File system GUID of the volume which hosts the NVRAM variable store
/// (`gEfiSystemNvDataFvGuid`).
pub const EFI_SYSTEM_NV_DATA_FV_GUID: Guid =
    Guid::from_static_str("fff12b8d-7696-4c8b-a985-2747075b4f50");
