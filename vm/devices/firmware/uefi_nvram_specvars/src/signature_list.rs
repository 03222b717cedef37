// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Code to build and parse [`EFI_SIGNATURE_LIST`] structures.
//!
//! [`ParseSignatureLists`] is the entrypoint to iterate over a buffer of
//! serialized `EFI_SIGNATURE_LIST` objects, as stored in `PK`, `KEK`, `db`
//! and `dbx`.

use guid::Guid;
use std::borrow::Cow;
use thiserror::Error;
use uefi_specs::uefi::nvram::signature_list::EFI_CERT_SHA256_GUID;
use uefi_specs::uefi::nvram::signature_list::EFI_CERT_X509_GUID;
use uefi_specs::uefi::nvram::signature_list::EFI_SIGNATURE_DATA;
use uefi_specs::uefi::nvram::signature_list::EFI_SIGNATURE_LIST;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;

/// Rust-y representation of a [`EFI_SIGNATURE_DATA`] struct.
#[derive(Debug, PartialEq, Eq)]
pub struct SignatureData<'a> {
    pub header: EFI_SIGNATURE_DATA,
    pub data: Cow<'a, [u8]>,
}

/// Rust-y representation of a [`EFI_SIGNATURE_LIST`] struct.
///
/// Every entry in a list has the same size, so certificate lists produced
/// here always hold exactly one certificate.
#[derive(Debug, PartialEq, Eq)]
pub struct SignatureList<'a> {
    pub signature_type: Guid,
    pub signatures: Vec<SignatureData<'a>>,
}

impl<'a> SignatureList<'a> {
    /// A list holding a single X.509 certificate owned by `owner`. The
    /// certificate is opaque and is not validated.
    pub fn new_x509(owner: Guid, cert: Cow<'a, [u8]>) -> Self {
        SignatureList {
            signature_type: EFI_CERT_X509_GUID,
            signatures: vec![SignatureData {
                header: EFI_SIGNATURE_DATA {
                    signature_owner: owner,
                },
                data: cert,
            }],
        }
    }

    /// A short name for the signature type, for display.
    pub fn type_name(&self) -> &'static str {
        match self.signature_type {
            EFI_CERT_X509_GUID => "x509",
            EFI_CERT_SHA256_GUID => "sha256",
            _ => "unknown",
        }
    }

    fn signature_size(&self) -> usize {
        size_of::<EFI_SIGNATURE_DATA>() + self.signatures.first().map_or(0, |s| s.data.len())
    }

    /// Serialize the signature list as a `EFI_SIGNATURE_LIST` into a vec
    pub fn extend_as_spec_signature_list(&self, res: &mut Vec<u8>) {
        let signature_size = self.signature_size();
        debug_assert!(self
            .signatures
            .iter()
            .all(|s| size_of::<EFI_SIGNATURE_DATA>() + s.data.len() == signature_size));

        let header = EFI_SIGNATURE_LIST {
            signature_type: self.signature_type,
            signature_list_size: (size_of::<EFI_SIGNATURE_LIST>()
                + signature_size * self.signatures.len()) as u32,
            signature_header_size: 0,
            signature_size: signature_size as u32,
        };

        res.extend_from_slice(header.as_bytes());
        for sig in &self.signatures {
            res.extend_from_slice(sig.header.as_bytes());
            res.extend_from_slice(&sig.data);
        }
    }
}

/// Errors which may occur during `EFI_SIGNATURE_LIST` parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("could not read signature list header")]
    InvalidHeader,
    #[error("signature list size {0} is smaller than its header")]
    InvalidListSize(u32),
    #[error("buffer contains less data than specified in EFI_SIGNATURE_LIST header")]
    TruncatedData,
    #[error("invalid signature_size {0}")]
    InvalidSigSize(u32),
    #[error("signature list body of {len} bytes is not a multiple of signature_size {signature_size}")]
    RaggedSignatures { len: usize, signature_size: u32 },
}

/// Iterator over a series of `EFI_SIGNATURE_LIST` structs in a single buffer.
pub struct ParseSignatureLists<'a> {
    buf: &'a [u8],
}

impl<'a> ParseSignatureLists<'a> {
    /// Instantiate a `ParseSignatureLists` with the given `buf`
    pub fn new(buf: &'a [u8]) -> ParseSignatureLists<'a> {
        ParseSignatureLists { buf }
    }

    fn next_inner(&mut self) -> Result<Option<SignatureList<'a>>, ParseError> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let (
            EFI_SIGNATURE_LIST {
                signature_type,
                signature_list_size,
                signature_header_size,
                signature_size,
            },
            buf,
        ) = EFI_SIGNATURE_LIST::read_from_prefix(self.buf)
            .map_err(|_| ParseError::InvalidHeader)?;

        let body_len = (signature_list_size as usize)
            .checked_sub(size_of::<EFI_SIGNATURE_LIST>() + signature_header_size as usize)
            .ok_or(ParseError::InvalidListSize(signature_list_size))?;
        let list_len = body_len + signature_header_size as usize;
        if buf.len() < list_len {
            return Err(ParseError::TruncatedData);
        }
        let (list, rest) = buf.split_at(list_len);
        let body = &list[signature_header_size as usize..];

        if (signature_size as usize) < size_of::<EFI_SIGNATURE_DATA>() {
            return Err(ParseError::InvalidSigSize(signature_size));
        }
        if body.len() % signature_size as usize != 0 {
            return Err(ParseError::RaggedSignatures {
                len: body.len(),
                signature_size,
            });
        }

        let mut signatures = Vec::new();
        for entry in body.chunks_exact(signature_size as usize) {
            let (header, data) = EFI_SIGNATURE_DATA::read_from_prefix(entry)
                .map_err(|_| ParseError::InvalidSigSize(signature_size))?;
            signatures.push(SignatureData {
                header,
                data: Cow::Borrowed(data),
            });
        }

        self.buf = rest;

        Ok(Some(SignatureList {
            signature_type,
            signatures,
        }))
    }
}

impl<'a> Iterator for ParseSignatureLists<'a> {
    type Item = Result<SignatureList<'a>, ParseError>;

    fn next(&mut self) -> Option<Result<SignatureList<'a>, ParseError>> {
        let res = self.next_inner();
        if res.is_err() {
            // don't keep yielding errors for the same list
            self.buf = &[];
        }
        res.transpose()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const OWNER_1: Guid = Guid {
        data1: 1,
        data2: 0,
        data3: 0,
        data4: [0, 0, 0, 0, 0, 0, 0, 0],
    };

    const OWNER_2: Guid = Guid {
        data1: 2,
        data2: 0,
        data3: 0,
        data4: [0, 0, 0, 0, 0, 0, 0, 0],
    };

    #[test]
    fn x509_layout() {
        let cert = vec![0xa5; 1200];
        let mut buf = Vec::new();
        SignatureList::new_x509(OWNER_1, cert.as_slice().into())
            .extend_as_spec_signature_list(&mut buf);

        assert_eq!(buf.len(), 28 + 16 + 1200);
        let (header, rest) = EFI_SIGNATURE_LIST::read_from_prefix(&buf).unwrap();
        assert_eq!(header.signature_type, EFI_CERT_X509_GUID);
        assert_eq!(header.signature_list_size, 28 + 16 + 1200);
        assert_eq!(header.signature_header_size, 0);
        assert_eq!(header.signature_size, 16 + 1200);
        assert_eq!(&rest[..16], OWNER_1.as_bytes());
        assert_eq!(&rest[16..], cert.as_slice());
    }

    #[test]
    fn parse_mixed_lists() {
        let sha256 = SignatureList {
            signature_type: EFI_CERT_SHA256_GUID,
            signatures: vec![
                SignatureData {
                    header: EFI_SIGNATURE_DATA {
                        signature_owner: OWNER_1,
                    },
                    data: Cow::Owned(vec![0; 32]),
                },
                SignatureData {
                    header: EFI_SIGNATURE_DATA {
                        signature_owner: OWNER_2,
                    },
                    data: Cow::Owned(vec![1; 32]),
                },
            ],
        };
        let x509 = SignatureList::new_x509(OWNER_2, b"some cert data"[..].into());

        let mut buf = Vec::new();
        sha256.extend_as_spec_signature_list(&mut buf);
        x509.extend_as_spec_signature_list(&mut buf);

        let lists = ParseSignatureLists::new(&buf)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(lists, vec![sha256, x509]);
        assert_eq!(lists[0].type_name(), "sha256");
        assert_eq!(lists[1].type_name(), "x509");
    }

    #[test]
    fn truncated_list() {
        let mut buf = Vec::new();
        SignatureList::new_x509(OWNER_1, b"cert"[..].into()).extend_as_spec_signature_list(&mut buf);
        buf.pop();

        let mut lists = ParseSignatureLists::new(&buf);
        assert_eq!(lists.next(), Some(Err(ParseError::TruncatedData)));
        assert_eq!(lists.next(), None);
    }
}
