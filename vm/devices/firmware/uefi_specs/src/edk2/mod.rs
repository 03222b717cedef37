// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Formats defined by the EDK2 reference implementation rather than by a
//! published spec.

pub mod variable;

/// Vendor GUID of the `SecureBootEnable` variable
/// (`gEfiSecureBootEnableDisableGuid`).
pub const SECURE_BOOT_ENABLE_DISABLE_GUID: guid::Guid =
    guid::Guid::from_static_str("f0a30bc7-af08-4556-99c4-001009c93a44");

/// Name of the variable which turns secure boot enforcement on at first boot.
pub const SECURE_BOOT_ENABLE_NAME: &str = "SecureBootEnable";
