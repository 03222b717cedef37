// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Locating and patching the TDVF metadata of a TD firmware image.
//!
//! The VMM finds the metadata descriptor table through a u32 offset stored
//! [`METADATA_OFFSET_SLOT`] bytes before the end of the image. The table
//! itself follows a 16-byte GUID somewhere in the boot firmware volume.

#![expect(missing_docs)]
#![forbid(unsafe_code)]

pub mod descriptor;

pub use descriptor::DescriptorTable;

use guid::Guid;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;
use zerocopy::IntoBytes;

/// GUID placed immediately before the descriptor table.
pub const TDVF_METADATA_GUID: Guid =
    Guid::from_static_str("e9eaf9f3-168e-44d5-a8eb-7f4d8738f6ae");

/// Distance of the metadata offset slot from the end of the image.
pub const METADATA_OFFSET_SLOT: usize = 0x20;

/// The signature is only searched for at this alignment.
const SCAN_ALIGNMENT: usize = 4;

#[derive(Debug, Error)]
pub enum Error {
    #[error("input file {} not found", .0.display())]
    InputNotFound(PathBuf),
    #[error("image is {0} bytes, too small to hold the metadata offset")]
    ImageTooSmall(usize),
    #[error("TDVF metadata signature not found")]
    SignatureNotFound,
    #[error("metadata offset {0:#x} does not fit in 32 bits")]
    OffsetOverflow(usize),
    #[error("metadata offset {offset:#x} is outside the {size:#x} byte image")]
    InvalidOffset { offset: u32, size: usize },
    #[error("no TDVF descriptor at offset {offset:#x}")]
    InvalidDescriptor { offset: u32 },
    #[error("descriptor at offset {offset:#x} declares {count} sections past the end of the image")]
    TruncatedSectionTable { offset: u32, count: u32 },
    #[error("file system error")]
    Io(#[from] std::io::Error),
}

fn slot(size: usize) -> Result<std::ops::Range<usize>, Error> {
    let start = size
        .checked_sub(METADATA_OFFSET_SLOT)
        .ok_or(Error::ImageTooSmall(size))?;
    Ok(start..start + 4)
}

/// Find the first 4-byte aligned occurrence of [`TDVF_METADATA_GUID`],
/// returning the offset just past it.
pub fn find_metadata(image: &[u8]) -> Option<usize> {
    let signature = TDVF_METADATA_GUID.as_bytes();
    (0..image.len())
        .step_by(SCAN_ALIGNMENT)
        .find(|&i| image[i..].starts_with(signature))
        .map(|i| i + signature.len())
}

/// Return a copy of `image` with the metadata offset slot pointing at the
/// descriptor table, along with the offset written.
pub fn inject(image: &[u8]) -> Result<(Vec<u8>, u32), Error> {
    let slot = slot(image.len())?;
    let end = find_metadata(image).ok_or(Error::SignatureNotFound)?;
    let offset = u32::try_from(end).map_err(|_| Error::OffsetOverflow(end))?;

    let mut out = image.to_vec();
    out[slot.clone()].copy_from_slice(&offset.to_le_bytes());
    tracing::debug!(offset, slot = slot.start, "injected metadata offset");
    Ok((out, offset))
}

/// The value currently stored in the metadata offset slot.
pub fn metadata_offset(image: &[u8]) -> Result<u32, Error> {
    let slot = slot(image.len())?;
    let mut raw = [0; 4];
    raw.copy_from_slice(&image[slot]);
    Ok(u32::from_le_bytes(raw))
}

/// Decode the descriptor table the offset slot points at.
pub fn read_descriptor(image: &[u8]) -> Result<(u32, DescriptorTable), Error> {
    let offset = metadata_offset(image)?;
    if offset == 0 || offset as usize > image.len() {
        return Err(Error::InvalidOffset {
            offset,
            size: image.len(),
        });
    }
    let table = DescriptorTable::parse(&image[offset as usize..], offset)?;
    Ok((offset, table))
}

/// Patch the metadata offset of the image at `source`, writing to `output`,
/// or back to `source` when no output is given. Returns the offset written.
pub fn inject_file(source: &Path, output: Option<&Path>) -> Result<u32, Error> {
    let image = fs_err::read(source).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::InputNotFound(source.to_owned()),
        _ => Error::Io(e),
    })?;
    let (patched, offset) = inject(&image)?;
    let output = output.unwrap_or(source);
    fs_err::write(output, &patched)?;
    tracing::info!(
        offset,
        slot = patched.len() - METADATA_OFFSET_SLOT,
        output = %output.display(),
        "injected metadata offset"
    );

    match read_descriptor(&patched) {
        Ok((_, table)) => tracing::debug!("metadata descriptor:\n{table}"),
        Err(e) => tracing::warn!(
            error = &e as &dyn std::error::Error,
            "injected offset does not point at a valid descriptor"
        ),
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Section;
    use crate::descriptor::SectionAttributes;
    use crate::descriptor::SectionType;

    const MIB: usize = 1024 * 1024;

    fn image_with_metadata(size: usize, at: usize) -> Vec<u8> {
        let mut image = vec![0xff; size];
        image[at..at + 16].copy_from_slice(TDVF_METADATA_GUID.as_bytes());
        let table = DescriptorTable::new(vec![Section {
            data_offset: 0,
            raw_data_size: 0x1000,
            memory_address: 0xffe00000,
            memory_data_size: 0x1000,
            section_type: SectionType::Cfv,
            attributes: SectionAttributes::new(),
        }])
        .encode();
        image[at + 16..at + 16 + table.len()].copy_from_slice(&table);
        image
    }

    #[test]
    fn inject_two_mib_image() {
        let image = image_with_metadata(2 * MIB, MIB);
        let (out, offset) = inject(&image).unwrap();

        assert_eq!(offset, 0x100010);
        assert_eq!(out[2 * MIB - 32..2 * MIB - 28], 0x100010u32.to_le_bytes());
        assert_eq!(out.len(), image.len());
        assert_eq!(out[..2 * MIB - 32], image[..2 * MIB - 32]);
        assert_eq!(out[2 * MIB - 28..], image[2 * MIB - 28..]);

        let (at, table) = read_descriptor(&out).unwrap();
        assert_eq!(at, 0x100010);
        assert_eq!(table.sections[0].section_type, SectionType::Cfv);
    }

    #[test]
    fn signature_must_be_aligned() {
        let image = image_with_metadata(0x2000, 0x802);
        assert!(matches!(inject(&image), Err(Error::SignatureNotFound)));

        let image = image_with_metadata(0x2000, 0x804);
        assert_eq!(find_metadata(&image), Some(0x814));
    }

    #[test]
    fn first_match_wins() {
        let mut image = image_with_metadata(0x2000, 0x1000);
        image[0x100..0x110].copy_from_slice(TDVF_METADATA_GUID.as_bytes());
        assert_eq!(inject(&image).unwrap().1, 0x110);
    }

    #[test]
    fn small_images() {
        assert!(matches!(inject(&[0; 0x1f]), Err(Error::ImageTooSmall(0x1f))));
        assert!(matches!(inject(&[0; 0x20]), Err(Error::SignatureNotFound)));
    }

    #[test]
    fn invalid_offsets() {
        let mut image = vec![0; 0x1000];
        assert!(matches!(
            read_descriptor(&image),
            Err(Error::InvalidOffset { offset: 0, .. })
        ));

        image[0x1000 - 32..0x1000 - 28].copy_from_slice(&0x1001u32.to_le_bytes());
        assert!(matches!(
            read_descriptor(&image),
            Err(Error::InvalidOffset { offset: 0x1001, .. })
        ));

        image[0x1000 - 32..0x1000 - 28].copy_from_slice(&0x10u32.to_le_bytes());
        assert!(matches!(
            read_descriptor(&image),
            Err(Error::InvalidDescriptor { offset: 0x10 })
        ));
    }

    #[test]
    fn inject_in_place_and_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("TDVF.fd");
        let image = image_with_metadata(0x4000, 0x400);
        fs_err::write(&source, &image).unwrap();

        let output = dir.path().join("TDVF.out.fd");
        assert_eq!(inject_file(&source, Some(&output)).unwrap(), 0x410);
        assert_eq!(fs_err::read(&source).unwrap(), image);
        let out = fs_err::read(&output).unwrap();
        assert_eq!(metadata_offset(&out).unwrap(), 0x410);

        inject_file(&source, None).unwrap();
        assert_eq!(fs_err::read(&source).unwrap(), out);

        assert!(matches!(
            inject_file(&dir.path().join("missing.fd"), None),
            Err(Error::InputNotFound(_))
        ));
    }
}
