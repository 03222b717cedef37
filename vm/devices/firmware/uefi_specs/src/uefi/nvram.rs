// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! UEFI Nvram Variable Services

use crate::uefi::signing::WIN_CERTIFICATE_UEFI_GUID;
use crate::uefi::time::EFI_TIME;
use bitfield_struct::bitfield;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// UEFI spec 8.2 - Variable Services
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct EfiVariableAttributes {
    pub non_volatile: bool,
    pub bootservice_access: bool,
    pub runtime_access: bool,
    pub hardware_error_record: bool,
    pub authenticated_write_access: bool,
    pub time_based_authenticated_write_access: bool,
    pub append_write: bool,
    pub enhanced_authenticated_access: bool,

    #[bits(24)]
    _reserved: u32,
}

impl EfiVariableAttributes {
    /// NV | BS, used for boot-time configuration flags.
    pub const BOOT_NON_VOLATILE: EfiVariableAttributes = EfiVariableAttributes::new()
        .with_non_volatile(true)
        .with_bootservice_access(true);
    /// NV | BS | RT
    pub const DEFAULT_ATTRIBUTES: EfiVariableAttributes =
        Self::BOOT_NON_VOLATILE.with_runtime_access(true);
    /// NV | BS | RT | TIME_BASED_AUTHENTICATED_WRITE_ACCESS, used by every
    /// secure boot policy variable.
    pub const DEFAULT_ATTRIBUTES_TIME_BASED_AUTH: EfiVariableAttributes =
        Self::DEFAULT_ATTRIBUTES.with_time_based_authenticated_write_access(true);
}

/// UEFI spec 8.2
///
/// The prefix of a signed variable update payload (e.g: a `dbx` update
/// package). `auth_info.header.length` counts from the start of `auth_info`.
#[derive(Debug, Copy, Clone, IntoBytes, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct EFI_VARIABLE_AUTHENTICATION_2 {
    /// Components Pad1, Nanosecond, TimeZone, Daylight and Pad2 shall be set to
    /// 0. This means that the time shall always be expressed in GMT.
    pub timestamp: EFI_TIME,
    /// Provides the authorization for the variable access.
    pub auth_info: WIN_CERTIFICATE_UEFI_GUID,
}

const_assert_eq!(size_of::<EFI_VARIABLE_AUTHENTICATION_2>(), 40);

/// UEFI spec 32.4.1
pub mod signature_list {
    use guid::Guid;
    use static_assertions::const_assert_eq;
    use zerocopy::FromBytes;
    use zerocopy::Immutable;
    use zerocopy::IntoBytes;
    use zerocopy::KnownLayout;

    #[derive(Debug, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
    #[repr(C)]
    pub struct EFI_SIGNATURE_LIST {
        /// Type of the signature.
        pub signature_type: Guid,
        /// Total size of the signature list, including this header.
        pub signature_list_size: u32,
        /// Size of the signature header which precedes the array of signatures.
        /// Always zero for the signature types defined by the spec.
        pub signature_header_size: u32,
        /// Size of each signature. Must be at least the size of EFI_SIGNATURE_DATA.
        pub signature_size: u32,
        // UINT8 SignatureHeader[SignatureHeaderSize];
        // EFI_SIGNATURE_DATA Signatures[…][SignatureSize];
    }

    const_assert_eq!(size_of::<EFI_SIGNATURE_LIST>(), 28);

    #[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
    #[repr(C)]
    pub struct EFI_SIGNATURE_DATA {
        /// Identifies the agent which added the signature to the list.
        pub signature_owner: Guid,
        // UINT8 SignatureData[…];
    }

    const_assert_eq!(size_of::<EFI_SIGNATURE_DATA>(), 16);

    pub const EFI_CERT_SHA256_GUID: Guid =
        Guid::from_static_str("c1c41626-504c-4092-aca9-41f936934328");

    pub const EFI_CERT_X509_GUID: Guid =
        Guid::from_static_str("a5c059a1-94e4-4aa7-87b5-ab155c2bf072");
}

/// UEFI spec 3.3 - Table 3-1, and 32.6.1
pub mod vars {
    use guid::Guid;

    /// UEFI spec 3.3 - Globally Defined Variables
    pub const EFI_GLOBAL_VARIABLE: Guid =
        Guid::from_static_str("8BE4DF61-93CA-11D2-AA0D-00E098032B8C");

    /// UEFI spec 32.6.1 - UEFI Image Variable GUID & Variable Name
    pub const IMAGE_SECURITY_DATABASE_GUID: Guid =
        Guid::from_static_str("d719b2cb-3d3a-4596-a3bc-dad00e67656f");

    pub const PK: &str = "PK";
    pub const KEK: &str = "KEK";
    pub const DB: &str = "db";
    pub const DBX: &str = "dbx";
}
