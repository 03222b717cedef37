// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Decoding and encoding of `AUTHENTICATED_VARIABLE_HEADER` records.

use crate::VariableName;
use guid::Guid;
use uefi_specs::edk2::variable::AUTHENTICATED_VARIABLE_HEADER;
use uefi_specs::edk2::variable::HEADER_ALIGNMENT;
use uefi_specs::edk2::variable::VARIABLE_DATA;
use uefi_specs::edk2::variable::VAR_ADDED;
use uefi_specs::uefi::nvram::EfiVariableAttributes;
use uefi_specs::uefi::time::EFI_TIME;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;

/// Padding between records, matching erased flash.
pub(crate) const PAD_BYTE: u8 = 0xff;

pub(crate) const fn align_up(len: usize) -> usize {
    (len + HEADER_ALIGNMENT - 1) & !(HEADER_ALIGNMENT - 1)
}

/// A live variable record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Name blob, including the terminator.
    pub name: VariableName,
    /// Vendor GUID.
    pub vendor: Guid,
    /// Record state byte.
    pub state: u8,
    /// The header's reserved byte, preserved as found.
    pub reserved: u8,
    /// Attribute bits.
    pub attributes: EfiVariableAttributes,
    /// Monotonic counter.
    pub monotonic_count: u64,
    /// Timestamp of the last authenticated write.
    pub timestamp: EFI_TIME,
    /// Index into the public key database.
    pub pubkey_index: u32,
    /// Variable payload.
    pub data: Vec<u8>,
}

/// Why a record scan stopped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ScanEnd {
    /// Not enough bytes left for another header.
    Exhausted,
    /// The next header does not start with `VARIABLE_DATA`.
    NoStartMarker(u16),
    /// The next record is not in the `VAR_ADDED` state.
    NotAdded(u8),
    /// The next record's name and data run past the region.
    Overrun,
}

pub(crate) enum Scan {
    Record(Variable, usize),
    End(ScanEnd),
}

impl Variable {
    /// A new live variable, with a zero monotonic count and key index.
    pub fn new(
        name: VariableName,
        vendor: Guid,
        attributes: EfiVariableAttributes,
        timestamp: EFI_TIME,
        data: Vec<u8>,
    ) -> Self {
        Self {
            name,
            vendor,
            state: VAR_ADDED,
            reserved: 0,
            attributes,
            monotonic_count: 0,
            timestamp,
            pubkey_index: 0,
            data,
        }
    }

    /// Decode the record at the start of `buf`, returning it along with the
    /// number of bytes it spans including alignment padding.
    pub(crate) fn scan(buf: &[u8]) -> Scan {
        let Ok((header, rest)) = AUTHENTICATED_VARIABLE_HEADER::read_from_prefix(buf) else {
            return Scan::End(ScanEnd::Exhausted);
        };
        if header.start_id != VARIABLE_DATA {
            return Scan::End(ScanEnd::NoStartMarker(header.start_id));
        }
        if header.state != VAR_ADDED {
            return Scan::End(ScanEnd::NotAdded(header.state));
        }

        let name_size = header.name_size as usize;
        let data_size = header.data_size as usize;
        if name_size.saturating_add(data_size) > rest.len() {
            return Scan::End(ScanEnd::Overrun);
        }
        let (name, rest) = rest.split_at(name_size);
        let data = &rest[..data_size];

        let len = size_of::<AUTHENTICATED_VARIABLE_HEADER>() + name_size + data_size;
        let variable = Variable {
            name: VariableName::from_bytes(name.to_vec()),
            vendor: header.vendor_guid,
            state: header.state,
            reserved: header.reserved,
            attributes: header.attributes.into(),
            monotonic_count: header.monotonic_count.get(),
            timestamp: header.timestamp,
            pubkey_index: header.pubkey_index,
            data: data.to_vec(),
        };
        // the last record may end flush with the region, without padding
        Scan::Record(variable, align_up(len).min(buf.len()))
    }

    /// Size of the encoded record, including trailing alignment padding.
    pub fn encoded_len(&self) -> usize {
        align_up(
            size_of::<AUTHENTICATED_VARIABLE_HEADER>()
                + self.name.as_bytes().len()
                + self.data.len(),
        )
    }

    /// Append the encoded record, padded to the next record boundary.
    pub(crate) fn extend_encoded(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        buf.extend_from_slice(
            AUTHENTICATED_VARIABLE_HEADER {
                start_id: VARIABLE_DATA,
                state: self.state,
                reserved: self.reserved,
                attributes: self.attributes.into(),
                monotonic_count: self.monotonic_count.into(),
                timestamp: self.timestamp,
                pubkey_index: self.pubkey_index,
                name_size: self.name.as_bytes().len() as u32,
                data_size: self.data.len() as u32,
                vendor_guid: self.vendor,
            }
            .as_bytes(),
        );
        buf.extend_from_slice(self.name.as_bytes());
        buf.extend_from_slice(&self.data);
        buf.resize(start + align_up(buf.len() - start), PAD_BYTE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uefi_specs::uefi::nvram::vars::EFI_GLOBAL_VARIABLE;

    fn encode(var: &Variable) -> Vec<u8> {
        let mut buf = Vec::new();
        var.extend_encoded(&mut buf);
        buf
    }

    #[test]
    fn encode_layout() {
        let var = Variable::new(
            "PK".into(),
            EFI_GLOBAL_VARIABLE,
            EfiVariableAttributes::DEFAULT_ATTRIBUTES_TIME_BASED_AUTH,
            EFI_TIME::new_utc(2024, 1, 2, 3, 4, 5),
            vec![0xaa; 3],
        );
        let buf = encode(&var);

        // 60 byte header + 6 byte name + 3 byte data, padded to 72
        assert_eq!(buf.len(), 72);
        assert_eq!(var.encoded_len(), 72);
        assert_eq!(&buf[0..2], &[0xaa, 0x55]);
        assert_eq!(buf[2], VAR_ADDED);
        assert_eq!(&buf[4..8], &0x27u32.to_le_bytes());
        assert_eq!(&buf[16..18], &2024u16.to_le_bytes());
        assert_eq!(&buf[36..40], &6u32.to_le_bytes());
        assert_eq!(&buf[40..44], &3u32.to_le_bytes());
        assert_eq!(&buf[60..66], b"P\0K\0\0\0");
        assert_eq!(&buf[66..69], &[0xaa; 3]);
        assert_eq!(&buf[69..], &[PAD_BYTE; 3]);
    }

    #[test]
    fn scan_roundtrip() {
        let mut var = Variable::new(
            "Lang".into(),
            Guid::ZERO,
            EfiVariableAttributes::DEFAULT_ATTRIBUTES,
            EFI_TIME::ZEROED,
            b"eng".to_vec(),
        );
        var.monotonic_count = 7;
        var.pubkey_index = 3;
        let buf = encode(&var);

        match Variable::scan(&buf) {
            Scan::Record(decoded, len) => {
                assert_eq!(decoded, var);
                assert_eq!(len, buf.len());
            }
            Scan::End(end) => panic!("unexpected end {end:?}"),
        }
    }

    #[test]
    fn scan_stops() {
        let var = Variable::new(
            "A".into(),
            Guid::ZERO,
            EfiVariableAttributes::DEFAULT_ATTRIBUTES,
            EFI_TIME::ZEROED,
            vec![1, 2, 3, 4],
        );
        let buf = encode(&var);

        assert!(matches!(
            Variable::scan(&buf[..59]),
            Scan::End(ScanEnd::Exhausted)
        ));
        assert!(matches!(
            Variable::scan(&buf[..62]),
            Scan::End(ScanEnd::Overrun)
        ));
        assert!(matches!(
            Variable::scan(&[PAD_BYTE; 64]),
            Scan::End(ScanEnd::NoStartMarker(0xffff))
        ));

        let mut deleted = buf.clone();
        deleted[2] = uefi_specs::edk2::variable::VAR_DELETED;
        assert!(matches!(
            Variable::scan(&deleted),
            Scan::End(ScanEnd::NotAdded(0xfd))
        ));
    }
}
