// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Writing the secure boot policy variables into a [`VariableStore`].

use crate::Error;
use crate::Rejected;
use fd_varstore::VariableName;
use fd_varstore::VariableStore;
use guid::Guid;
use uefi_nvram_specvars::auth_payload::parse_authenticated_payload;
use uefi_nvram_specvars::signature_list::SignatureList;
use uefi_specs::edk2::SECURE_BOOT_ENABLE_NAME;
use uefi_specs::uefi::nvram::vars;
use uefi_specs::uefi::nvram::EfiVariableAttributes;

/// The signature database variables.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SecureBootKey {
    /// Platform Key
    Pk,
    /// Key Exchange Key
    Kek,
    /// Allowed signature database
    Db,
    /// Forbidden signature database
    Dbx,
}

impl SecureBootKey {
    /// Recognize a database variable name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Pk, Self::Kek, Self::Db, Self::Dbx]
            .into_iter()
            .find(|key| key.name().eq_ignore_ascii_case(name))
    }

    /// The variable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pk => vars::PK,
            Self::Kek => vars::KEK,
            Self::Db => vars::DB,
            Self::Dbx => vars::DBX,
        }
    }

    /// The vendor GUID the variable is stored under.
    pub fn vendor(self) -> Guid {
        match self {
            Self::Pk | Self::Kek => vars::EFI_GLOBAL_VARIABLE,
            Self::Db | Self::Dbx => vars::IMAGE_SECURITY_DATABASE_GUID,
        }
    }

    fn check_append(self, append: bool) -> Result<(), Rejected> {
        if append && self == Self::Pk {
            return Err(Rejected::AppendToPk);
        }
        Ok(())
    }
}

/// Enroll `cert` as a single-certificate X.509 signature list owned by
/// `owner`.
pub fn enroll_certificate(
    store: &mut VariableStore,
    key: SecureBootKey,
    owner: Guid,
    cert: &[u8],
    append: bool,
) -> Result<(), Error> {
    key.check_append(append)?;

    let mut data = Vec::new();
    SignatureList::new_x509(owner, cert.into()).extend_as_spec_signature_list(&mut data);

    tracing::info!(
        key = key.name(),
        %owner,
        cert_len = cert.len(),
        append,
        "enrolling certificate"
    );
    store.add(
        &VariableName::from(key.name()),
        key.vendor(),
        EfiVariableAttributes::DEFAULT_ATTRIBUTES_TIME_BASED_AUTH,
        None,
        &data,
        append,
    )?;
    Ok(())
}

/// Enroll a signed variable update, such as a published dbx update. The
/// variable takes the update's timestamp, and its data is everything after
/// the authentication header.
pub fn enroll_signed_update(
    store: &mut VariableStore,
    key: SecureBootKey,
    update: &[u8],
    append: bool,
) -> Result<(), Error> {
    key.check_append(append)?;

    let payload = parse_authenticated_payload(update)?;

    tracing::info!(
        key = key.name(),
        timestamp = %payload.timestamp,
        len = payload.data.len(),
        append,
        "enrolling signed update"
    );
    store.add(
        &VariableName::from(key.name()),
        key.vendor(),
        EfiVariableAttributes::DEFAULT_ATTRIBUTES_TIME_BASED_AUTH,
        Some(payload.timestamp),
        payload.data,
        append,
    )?;
    Ok(())
}

/// Set the `SecureBootEnable` flag variable.
pub fn enroll_secure_boot_enable(
    store: &mut VariableStore,
    vendor: Guid,
    data: &[u8],
) -> Result<(), Error> {
    tracing::info!(%vendor, len = data.len(), "enrolling SecureBootEnable");
    store.add(
        &VariableName::from(SECURE_BOOT_ENABLE_NAME),
        vendor,
        EfiVariableAttributes::BOOT_NON_VOLATILE,
        None,
        data,
        false,
    )?;
    Ok(())
}
