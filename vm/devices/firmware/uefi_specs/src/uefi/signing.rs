// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Authentication descriptors used by `EFI_VARIABLE_AUTHENTICATION_2`.

use guid::Guid;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// UEFI spec 32.2.4
///
/// The certificate header.
#[derive(Debug, Copy, Clone, IntoBytes, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct WIN_CERTIFICATE {
    /// The length of the entire certificate, including the length of the header,
    /// in bytes
    pub length: u32,
    /// The revision level of the WIN_CERTIFICATE structure (0x0200).
    pub revision: u16,
    /// One of the WIN_CERT_TYPE_xxx values.
    pub certificate_type: u16,
    // UINT8 bCertificate[ANYSIZE_ARRAY];
}

const_assert_eq!(size_of::<WIN_CERTIFICATE>(), 8);

/// UEFI spec 32.2.4 - WIN_CERTIFICATE_UEFI_GUID
#[derive(Debug, Copy, Clone, IntoBytes, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct WIN_CERTIFICATE_UEFI_GUID {
    /// certificate_type is set to WIN_CERT_TYPE_EFI_GUID.
    pub header: WIN_CERTIFICATE,
    /// Determines the format of the CertData.
    pub cert_type: Guid,
    // UINT8 CertData[ANYSIZE_ARRAY];
}

const_assert_eq!(size_of::<WIN_CERTIFICATE_UEFI_GUID>(), 24);

/// UEFI spec 32.2.4 - WIN_CERTIFICATE_UEFI_GUID
pub const EFI_CERT_TYPE_PKCS7_GUID: Guid =
    Guid::from_static_str("4aafd29d-68df-49ee-8aa9-347d375665a7");

/// UEFI spec 32.2.4 - WIN_CERTIFICATE
pub const WIN_CERT_TYPE_EFI_GUID: u16 = 0x0EF1;
