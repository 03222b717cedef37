// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Splits a signed variable update (such as a published `dbx` update
//! package) into its timestamp and the variable data it carries.
//!
//! The file starts with an [`EFI_VARIABLE_AUTHENTICATION_2`] whose
//! `auth_info.header.length` covers the whole `WIN_CERTIFICATE_UEFI_GUID`
//! including the PKCS7 blob. Everything after it is the new variable data.
//!
//! [`EFI_VARIABLE_AUTHENTICATION_2`]: uefi_specs::uefi::nvram::EFI_VARIABLE_AUTHENTICATION_2

use thiserror::Error;
use uefi_specs::uefi::signing::WIN_CERTIFICATE;
use uefi_specs::uefi::time::EFI_TIME;
use zerocopy::FromBytes;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("authenticated payload is too short for its authentication header ({0} bytes)")]
    TruncatedHeader(usize),
    #[error("authentication info length {auth_info_len} is smaller than a certificate header")]
    AuthInfoTooSmall { auth_info_len: u32 },
    #[error("authentication info length {auth_info_len} runs past the end of the {len} byte payload")]
    AuthInfoOverrun { auth_info_len: u32, len: usize },
}

/// The pieces of a signed variable update.
#[derive(Debug)]
pub struct AuthenticatedPayload<'a> {
    pub timestamp: EFI_TIME,
    pub auth_info_len: u32,
    pub data: &'a [u8],
}

/// Parse a buffer holding an `EFI_VARIABLE_AUTHENTICATION_2` followed by
/// variable data.
pub fn parse_authenticated_payload(buf: &[u8]) -> Result<AuthenticatedPayload<'_>, Error> {
    let (timestamp, auth_info) =
        EFI_TIME::read_from_prefix(buf).map_err(|_| Error::TruncatedHeader(buf.len()))?;
    let (auth_info_len, _) =
        u32::read_from_prefix(auth_info).map_err(|_| Error::TruncatedHeader(buf.len()))?;

    if (auth_info_len as usize) < size_of::<WIN_CERTIFICATE>() {
        return Err(Error::AuthInfoTooSmall { auth_info_len });
    }

    let data = auth_info
        .get(auth_info_len as usize..)
        .ok_or(Error::AuthInfoOverrun {
            auth_info_len,
            len: buf.len(),
        })?;

    Ok(AuthenticatedPayload {
        timestamp,
        auth_info_len,
        data,
    })
}
