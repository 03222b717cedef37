// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::Error;
use std::ops::Range;
use uefi_specs::pi::firmware_volume::EFI_FIRMWARE_VOLUME_HEADER;
use uefi_specs::pi::firmware_volume::EFI_FVH_SIGNATURE;
use uefi_specs::pi::firmware_volume::EFI_SYSTEM_NV_DATA_FV_GUID;
use zerocopy::FromBytes;

/// Firmware volumes are at least this aligned within an FD.
const SCAN_STEP: usize = 16;

/// The firmware volume hosting the NVRAM variable store.
#[derive(Debug, Copy, Clone)]
pub struct NvramVolume {
    offset: usize,
    header: EFI_FIRMWARE_VOLUME_HEADER,
}

impl NvramVolume {
    /// Scan `image` for the first firmware volume with the `_FVH` signature
    /// and the system NV data file system GUID.
    pub fn locate(image: &[u8]) -> Result<Self, Error> {
        for offset in (0..image.len()).step_by(SCAN_STEP) {
            let Ok((header, _)) = EFI_FIRMWARE_VOLUME_HEADER::read_from_prefix(&image[offset..])
            else {
                break;
            };

            if header.signature != EFI_FVH_SIGNATURE
                || header.file_system_guid != EFI_SYSTEM_NV_DATA_FV_GUID
            {
                continue;
            }

            let header_length = header.header_length as usize;
            if header_length < size_of::<EFI_FIRMWARE_VOLUME_HEADER>()
                || header.fv_length < header_length as u64
                || header.fv_length > (image.len() - offset) as u64
            {
                tracing::warn!(
                    offset,
                    length = header.fv_length,
                    header_length,
                    "NVRAM firmware volume has implausible length"
                );
                return Err(Error::VolumeNotFound);
            }

            tracing::debug!(
                offset,
                length = header.fv_length,
                header_length,
                "found NVRAM firmware volume"
            );
            return Ok(NvramVolume { offset, header });
        }

        Err(Error::VolumeNotFound)
    }

    /// Offset of the volume header within the image.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The parsed volume header.
    pub fn header(&self) -> &EFI_FIRMWARE_VOLUME_HEADER {
        &self.header
    }

    /// The volume's byte window within the image.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.header.fv_length as usize
    }

    /// Offset of the first byte after the volume header (including its block
    /// map), where the variable store header lives.
    pub fn body_offset(&self) -> usize {
        self.offset + self.header.header_length as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blank_nvram_volume;
    use zerocopy::IntoBytes;

    #[test]
    fn locate_after_other_data() {
        let mut image = vec![0u8; 0x1000];
        image.extend(blank_nvram_volume(0x4000, 0x2000));
        image.extend(vec![0u8; 0x100]);

        let volume = NvramVolume::locate(&image).unwrap();
        assert_eq!(volume.offset(), 0x1000);
        assert_eq!(volume.range(), 0x1000..0x5000);
        assert_eq!(volume.body_offset(), 0x1048);
    }

    #[test]
    fn missing_volume() {
        assert!(matches!(
            NvramVolume::locate(&[0xff; 0x400]),
            Err(Error::VolumeNotFound)
        ));
        assert!(matches!(NvramVolume::locate(&[]), Err(Error::VolumeNotFound)));
    }

    #[test]
    fn other_volume_types_are_skipped() {
        let mut image = blank_nvram_volume(0x1000, 0x800);
        // corrupt the file system guid
        image[16] ^= 0xff;
        assert!(matches!(
            NvramVolume::locate(&image),
            Err(Error::VolumeNotFound)
        ));
    }

    #[test]
    fn truncated_volume() {
        let mut image = blank_nvram_volume(0x4000, 0x2000);
        image.truncate(0x3000);
        assert!(matches!(
            NvramVolume::locate(&image),
            Err(Error::VolumeNotFound)
        ));
    }

    fn set_header_length(image: &mut [u8], header_length: u16) {
        let (mut header, _) = EFI_FIRMWARE_VOLUME_HEADER::read_from_prefix(image).unwrap();
        header.header_length = header_length;
        image[..size_of::<EFI_FIRMWARE_VOLUME_HEADER>()].copy_from_slice(header.as_bytes());
    }

    #[test]
    fn short_header_length() {
        let mut image = blank_nvram_volume(0x4000, 0x2000);
        set_header_length(&mut image, 0x37);
        assert!(matches!(
            NvramVolume::locate(&image),
            Err(Error::VolumeNotFound)
        ));

        // the fixed header alone, without a block map, is accepted
        set_header_length(&mut image, 0x38);
        assert_eq!(NvramVolume::locate(&image).unwrap().body_offset(), 0x38);
    }

    #[test]
    fn header_longer_than_volume() {
        let mut image = blank_nvram_volume(0x4000, 0x2000);
        image.truncate(0x100);
        let (mut header, _) = EFI_FIRMWARE_VOLUME_HEADER::read_from_prefix(&image).unwrap();
        header.fv_length = 0x40;
        image[..size_of::<EFI_FIRMWARE_VOLUME_HEADER>()].copy_from_slice(header.as_bytes());
        assert!(matches!(
            NvramVolume::locate(&image),
            Err(Error::VolumeNotFound)
        ));
    }
}
