// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Provisions UEFI secure boot trust material into an FD image offline.
//!
//! [`variable_ops`] applies a single add/append/update/delete to one
//! variable. [`pipeline`] chains the full PK, KEK, db, dbx, SecureBootEnable
//! enrollment described by an [`EnrollmentConfig`].

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod keys;
pub mod pipeline;
pub mod variable_ops;

pub use config::EnrollmentConfig;
pub use pipeline::enroll_image;

use guid::Guid;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by enrollment operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A source image, certificate or payload file does not exist.
    #[error("input file {} not found", .0.display())]
    InputNotFound(PathBuf),
    /// Any other file system failure.
    #[error("file system error")]
    Io(#[from] io::Error),
    /// The image's variable store could not be decoded or re-encoded.
    #[error("variable store error")]
    Store(#[from] fd_varstore::Error),
    /// A signed variable update could not be parsed.
    #[error("invalid authenticated variable payload")]
    AuthPayload(#[from] uefi_nvram_specvars::auth_payload::Error),
    /// The request violates secure boot policy or is incomplete.
    #[error("operation rejected")]
    OperationRejected(#[from] Rejected),
    /// An update or delete named a variable that does not exist.
    #[error("variable {name} ({vendor}) not found")]
    VariableNotFound {
        /// Variable name.
        name: String,
        /// Vendor GUID.
        vendor: Guid,
    },
    /// The enrollment configuration is invalid.
    #[error("invalid enrollment configuration")]
    Config(#[from] config::ConfigError),
}

/// Reasons a request is refused before the store is touched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejected {
    /// Only one platform key may be enrolled.
    #[error("append cannot be used with PK")]
    AppendToPk,
    /// Variables other than the secure boot databases need explicit
    /// attributes.
    #[error("attributes are required for variable {0}")]
    MissingAttributes(String),
    /// Add, append and update need a payload file.
    #[error("a data file is required for variable {0}")]
    MissingPayload(String),
    /// The attribute string is not a hex number.
    #[error("invalid attributes {0:?}")]
    InvalidAttributes(String),
    /// The GUID text is not a valid RFC 4122 GUID.
    #[error("invalid guid {0:?}")]
    InvalidGuid(String, #[source] guid::ParseError),
}

/// Read a whole input file, reporting a missing file as
/// [`Error::InputNotFound`].
pub(crate) fn read_input(path: &Path) -> Result<Vec<u8>, Error> {
    fs_err::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::InputNotFound(path.to_owned()),
        _ => Error::Io(e),
    })
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use fd_varstore::blank_nvram_volume;
    use uefi_specs::uefi::nvram::EFI_VARIABLE_AUTHENTICATION_2;
    use uefi_specs::uefi::signing::EFI_CERT_TYPE_PKCS7_GUID;
    use uefi_specs::uefi::signing::WIN_CERTIFICATE;
    use uefi_specs::uefi::signing::WIN_CERTIFICATE_UEFI_GUID;
    use uefi_specs::uefi::signing::WIN_CERT_TYPE_EFI_GUID;
    use uefi_specs::uefi::time::EFI_TIME;
    use zerocopy::IntoBytes;

    /// Route tracing output through the test harness.
    pub fn init_tracing() {
        static ONCE: std::sync::Once = std::sync::Once::new();
        ONCE.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::DEBUG)
                .try_init();
        });
    }

    /// An FD with an empty NVRAM store followed by some code.
    pub fn test_image() -> Vec<u8> {
        let mut image = blank_nvram_volume(0x10000, 0x8000);
        image.extend(vec![0xc3; 0x1000]);
        image
    }

    /// A signed variable update carrying `data`, with a dummy PKCS7 blob.
    pub fn signed_update(timestamp: EFI_TIME, data: &[u8]) -> Vec<u8> {
        let pkcs7 = [0x30; 64];
        let mut update = EFI_VARIABLE_AUTHENTICATION_2 {
            timestamp,
            auth_info: WIN_CERTIFICATE_UEFI_GUID {
                header: WIN_CERTIFICATE {
                    length: (size_of::<WIN_CERTIFICATE_UEFI_GUID>() + pkcs7.len()) as u32,
                    revision: 0x0200,
                    certificate_type: WIN_CERT_TYPE_EFI_GUID,
                },
                cert_type: EFI_CERT_TYPE_PKCS7_GUID,
            },
        }
        .as_bytes()
        .to_vec();
        update.extend_from_slice(&pkcs7);
        update.extend_from_slice(data);
        update
    }
}
