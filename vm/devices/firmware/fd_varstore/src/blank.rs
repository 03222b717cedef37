// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use uefi_specs::edk2::variable::VARIABLE_STORE_HEADER;
use uefi_specs::edk2::variable::EFI_AUTHENTICATED_VARIABLE_BASED_TIME_GUID;
use uefi_specs::edk2::variable::VARIABLE_STORE_FORMATTED;
use uefi_specs::edk2::variable::VARIABLE_STORE_HEALTHY;
use uefi_specs::pi::firmware_volume::EFI_FIRMWARE_VOLUME_HEADER;
use uefi_specs::pi::firmware_volume::EFI_FVH_SIGNATURE;
use uefi_specs::pi::firmware_volume::EFI_SYSTEM_NV_DATA_FV_GUID;
use zerocopy::IntoBytes;

const BLOCK_SIZE: u32 = 0x1000;
// EFI_FVB2_READ_* | EFI_FVB2_WRITE_* | EFI_FVB2_STICKY_WRITE | EFI_FVB2_MEMORY_MAPPED
// | EFI_FVB2_ERASE_POLARITY | EFI_FVB2_ALIGNMENT_16
const NV_FV_ATTRIBUTES: u32 = 0x0004_feff;

/// Build an empty NVRAM firmware volume of `volume_len` bytes holding a
/// freshly formatted time-based authenticated variable store of `store_len`
/// bytes, the way the EDK2 build emits one before any variable is written.
///
/// Panics if `store_len` does not fit in the volume.
pub fn blank_nvram_volume(volume_len: usize, store_len: u32) -> Vec<u8> {
    // fixed header plus a two-entry block map: one run of blocks and the
    // zeroed terminator
    let header_length = size_of::<EFI_FIRMWARE_VOLUME_HEADER>() + 16;
    assert!(header_length + store_len as usize <= volume_len);

    let mut header = EFI_FIRMWARE_VOLUME_HEADER {
        zero_vector: [0; 16],
        file_system_guid: EFI_SYSTEM_NV_DATA_FV_GUID,
        fv_length: volume_len as u64,
        signature: EFI_FVH_SIGNATURE,
        attributes: NV_FV_ATTRIBUTES,
        header_length: header_length as u16,
        checksum: 0,
        ext_header_offset: 0,
        reserved: 0,
        revision: 2,
    };

    let mut block_map = Vec::with_capacity(16);
    block_map.extend_from_slice(&(volume_len as u32 / BLOCK_SIZE).to_le_bytes());
    block_map.extend_from_slice(&BLOCK_SIZE.to_le_bytes());
    block_map.extend_from_slice(&[0; 8]);

    // the 16-bit sum of the whole header must be zero
    let sum = [header.as_bytes(), block_map.as_slice()]
        .concat()
        .chunks_exact(2)
        .fold(0u16, |acc, w| {
            acc.wrapping_add(u16::from_le_bytes([w[0], w[1]]))
        });
    header.checksum = 0u16.wrapping_sub(sum);

    let store = VARIABLE_STORE_HEADER {
        signature: EFI_AUTHENTICATED_VARIABLE_BASED_TIME_GUID,
        size: store_len,
        format: VARIABLE_STORE_FORMATTED,
        state: VARIABLE_STORE_HEALTHY,
        reserved: 0,
        reserved1: 0,
    };

    let mut volume = vec![0xff; volume_len];
    volume[..size_of::<EFI_FIRMWARE_VOLUME_HEADER>()].copy_from_slice(header.as_bytes());
    volume[size_of::<EFI_FIRMWARE_VOLUME_HEADER>()..header_length].copy_from_slice(&block_map);
    volume[header_length..][..size_of::<VARIABLE_STORE_HEADER>()]
        .copy_from_slice(store.as_bytes());
    volume
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_checksum_is_zero() {
        let volume = blank_nvram_volume(0x4000, 0x2000);
        let sum = volume[..0x48]
            .chunks(2)
            .fold(0u16, |acc, w| acc.wrapping_add(u16::from_le_bytes([w[0], w[1]])));
        assert_eq!(sum, 0);
        assert_eq!(&volume[0x28..0x2c], b"_FVH");
        assert!(volume[0x48 + 28..].iter().all(|&b| b == 0xff));
    }
}
