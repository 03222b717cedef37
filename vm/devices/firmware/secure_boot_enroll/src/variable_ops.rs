// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Single-variable edits of an FD image.
//!
//! `PK`, `KEK`, `db` and `dbx` are recognized by name. For them the GUID
//! names the certificate owner, the vendor GUID and attributes are fixed,
//! and the payload is a certificate (or, for `dbx`, a signed update). Any
//! other variable is written as-is with the caller's vendor GUID and
//! attributes.

use crate::keys::enroll_certificate;
use crate::keys::enroll_signed_update;
use crate::keys::SecureBootKey;
use crate::read_input;
use crate::Error;
use crate::Rejected;
use fd_varstore::VariableName;
use fd_varstore::VariableStore;
use guid::Guid;
use std::path::PathBuf;
use std::str::FromStr;
use uefi_specs::uefi::nvram::EfiVariableAttributes;

/// The edit to perform.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VarOperation {
    /// Create the variable, or replace its data.
    Add,
    /// Create the variable, or extend its data.
    Append,
    /// Replace an existing variable, moving it to the end of the store.
    Update,
    /// Remove an existing variable.
    Delete,
}

impl FromStr for VarOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "add" => Self::Add,
            "append" => Self::Append,
            "update" => Self::Update,
            "delete" => Self::Delete,
            _ => return Err(format!("unknown variable operation {s:?}")),
        })
    }
}

/// Parse an attribute mask written in hex, with or without a `0x` prefix.
pub fn parse_attributes(s: &str) -> Result<EfiVariableAttributes, Rejected> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16)
        .map(EfiVariableAttributes::from)
        .map_err(|_| Rejected::InvalidAttributes(s.to_owned()))
}

/// One variable edit, with its payload already read.
#[derive(Debug)]
pub struct VarRequest<'a> {
    /// The edit.
    pub operation: VarOperation,
    /// Variable name.
    pub name: &'a str,
    /// Vendor GUID, or certificate owner for the signature databases.
    pub guid: Guid,
    /// Attributes for variables other than the signature databases.
    pub attributes: Option<EfiVariableAttributes>,
    /// New data. Unused by [`VarOperation::Delete`].
    pub payload: Option<&'a [u8]>,
}

impl VarRequest<'_> {
    fn identity(&self) -> (VariableName, Guid) {
        match SecureBootKey::from_name(self.name) {
            Some(key) => (key.name().into(), key.vendor()),
            None => (self.name.into(), self.guid),
        }
    }

    fn not_found(&self) -> Error {
        let (name, vendor) = self.identity();
        Error::VariableNotFound {
            name: name.to_string(),
            vendor,
        }
    }

    fn set(&self, store: &mut VariableStore, append: bool) -> Result<(), Error> {
        let payload = self
            .payload
            .ok_or_else(|| Rejected::MissingPayload(self.name.to_owned()))?;

        match SecureBootKey::from_name(self.name) {
            Some(SecureBootKey::Dbx) => {
                enroll_signed_update(store, SecureBootKey::Dbx, payload, append)
            }
            Some(key) => enroll_certificate(store, key, self.guid, payload, append),
            None => {
                let attributes = self
                    .attributes
                    .ok_or_else(|| Rejected::MissingAttributes(self.name.to_owned()))?;
                store.add(
                    &self.name.into(),
                    self.guid,
                    attributes,
                    None,
                    payload,
                    append,
                )?;
                Ok(())
            }
        }
    }

    /// Apply the edit to `store`.
    pub fn apply(&self, store: &mut VariableStore) -> Result<(), Error> {
        match self.operation {
            VarOperation::Add => self.set(store, false),
            VarOperation::Append => self.set(store, true),
            VarOperation::Update => {
                let (name, vendor) = self.identity();
                if store.find(&name, vendor).is_none() {
                    return Err(self.not_found());
                }
                // a failed update leaves the store as it was
                let saved = store.clone();
                store.delete(&name, vendor);
                if let Err(e) = self.set(store, false) {
                    *store = saved;
                    return Err(e);
                }
                Ok(())
            }
            VarOperation::Delete => {
                let (name, vendor) = self.identity();
                if !store.delete(&name, vendor) {
                    return Err(self.not_found());
                }
                Ok(())
            }
        }
    }
}

/// A variable edit described by file paths and text, as handed over by a
/// firmware build script or the command line.
#[derive(Debug, Clone)]
pub struct VarCommand {
    /// Image to read. Never modified unless it is also `output`.
    pub source: PathBuf,
    /// Where to write the edited image.
    pub output: PathBuf,
    /// The edit.
    pub operation: VarOperation,
    /// Variable name.
    pub name: String,
    /// Vendor or owner GUID, in 8-4-4-4-12 form.
    pub guid: String,
    /// Attribute mask in hex.
    pub attributes: Option<String>,
    /// File holding the new data.
    pub data_file: Option<PathBuf>,
}

impl VarCommand {
    /// Read the source image, apply the edit and write the result. Nothing
    /// is written if any step fails.
    pub fn run(&self) -> Result<(), Error> {
        let guid = Guid::parse_canonical(&self.guid.to_ascii_lowercase())
            .map_err(|e| Rejected::InvalidGuid(self.guid.clone(), e))?;
        let attributes = self
            .attributes
            .as_deref()
            .map(parse_attributes)
            .transpose()?;

        let image = read_input(&self.source)?;
        let payload = match &self.data_file {
            Some(path) if self.operation != VarOperation::Delete => Some(read_input(path)?),
            _ => None,
        };

        let mut store = VariableStore::load(&image)?;
        VarRequest {
            operation: self.operation,
            name: &self.name,
            guid,
            attributes,
            payload: payload.as_deref(),
        }
        .apply(&mut store)?;

        let out = store.serialize(&image)?;
        fs_err::write(&self.output, out)?;
        tracing::info!(
            operation = ?self.operation,
            name = self.name,
            output = %self.output.display(),
            "variable updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::init_tracing;
    use crate::test_helpers::signed_update;
    use crate::test_helpers::test_image;
    use uefi_specs::uefi::nvram::vars;
    use uefi_specs::uefi::time::EFI_TIME;

    const VENDOR: Guid = Guid::from_static_str("4c19049f-4137-4dd3-9c10-8b97a83ffdfa");

    fn request<'a>(
        operation: VarOperation,
        name: &'a str,
        payload: Option<&'a [u8]>,
    ) -> VarRequest<'a> {
        VarRequest {
            operation,
            name,
            guid: VENDOR,
            attributes: Some(EfiVariableAttributes::DEFAULT_ATTRIBUTES),
            payload,
        }
    }

    #[test]
    fn attribute_parsing() {
        assert_eq!(u32::from(parse_attributes("0x27").unwrap()), 0x27);
        assert_eq!(u32::from(parse_attributes("7").unwrap()), 7);
        assert_eq!(u32::from(parse_attributes("0X3").unwrap()), 3);
        assert_eq!(
            parse_attributes("nv|bs"),
            Err(Rejected::InvalidAttributes("nv|bs".into()))
        );
    }

    #[test]
    fn operation_parsing() {
        assert_eq!("update".parse(), Ok(VarOperation::Update));
        assert!("remove".parse::<VarOperation>().is_err());
    }

    #[test]
    fn generic_variable_lifecycle() {
        let image = test_image();
        let mut store = VariableStore::load(&image).unwrap();

        request(VarOperation::Add, "Other", Some(b"x"))
            .apply(&mut store)
            .unwrap();
        request(VarOperation::Add, "Setup", Some(b"abc"))
            .apply(&mut store)
            .unwrap();
        request(VarOperation::Append, "Setup", Some(b"def"))
            .apply(&mut store)
            .unwrap();
        assert_eq!(
            store.find(&"Setup".into(), VENDOR).unwrap().data,
            b"abcdef"
        );

        // update moves the variable to the end
        request(VarOperation::Update, "Other", Some(b"y"))
            .apply(&mut store)
            .unwrap();
        assert_eq!(
            store.iter().map(|v| v.name.to_string()).collect::<Vec<_>>(),
            ["Setup", "Other"]
        );
        assert_eq!(store.find(&"Other".into(), VENDOR).unwrap().data, b"y");

        request(VarOperation::Delete, "Setup", None)
            .apply(&mut store)
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_variables() {
        let image = test_image();
        let mut store = VariableStore::load(&image).unwrap();

        assert!(matches!(
            request(VarOperation::Delete, "Nope", None).apply(&mut store),
            Err(Error::VariableNotFound { .. })
        ));
        assert!(matches!(
            request(VarOperation::Update, "Nope", Some(b"1")).apply(&mut store),
            Err(Error::VariableNotFound { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn incomplete_requests() {
        let image = test_image();
        let mut store = VariableStore::load(&image).unwrap();

        let mut req = request(VarOperation::Add, "Setup", Some(b"1"));
        req.attributes = None;
        assert!(matches!(
            req.apply(&mut store),
            Err(Error::OperationRejected(Rejected::MissingAttributes(_)))
        ));
        assert!(matches!(
            request(VarOperation::Add, "Setup", None).apply(&mut store),
            Err(Error::OperationRejected(Rejected::MissingPayload(_)))
        ));

        request(VarOperation::Add, "Setup", Some(b"1"))
            .apply(&mut store)
            .unwrap();
        assert!(matches!(
            request(VarOperation::Update, "Setup", None).apply(&mut store),
            Err(Error::OperationRejected(Rejected::MissingPayload(_)))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_update_keeps_variable() {
        init_tracing();
        let image = test_image();
        let mut store = VariableStore::load(&image).unwrap();

        request(VarOperation::Add, "Setup", Some(b"1"))
            .apply(&mut store)
            .unwrap();
        request(VarOperation::Add, "Lang", Some(b"eng"))
            .apply(&mut store)
            .unwrap();

        let mut req = request(VarOperation::Update, "Setup", Some(b"2"));
        req.attributes = None;
        assert!(matches!(
            req.apply(&mut store),
            Err(Error::OperationRejected(Rejected::MissingAttributes(_)))
        ));
        assert_eq!(store.len(), 2);
        let setup = store.find(&"Setup".into(), VENDOR).unwrap();
        assert_eq!(setup.data, b"1");
        // the record kept its place ahead of Lang
        assert_eq!(store.iter().next().unwrap().name.to_string(), "Setup");

        let update = signed_update(EFI_TIME::new_utc(2024, 3, 1, 0, 0, 0), b"hashes");
        request(VarOperation::Add, "dbx", Some(&update))
            .apply(&mut store)
            .unwrap();
        // too short to carry an authentication header
        assert!(matches!(
            request(VarOperation::Update, "dbx", Some(&[0; 8])).apply(&mut store),
            Err(Error::AuthPayload(_))
        ));
        assert_eq!(store.len(), 3);
        let dbx = store
            .find(&"dbx".into(), vars::IMAGE_SECURITY_DATABASE_GUID)
            .unwrap();
        assert_eq!(dbx.data, b"hashes");
    }

    #[test]
    fn database_names_use_fixed_vendor() {
        let image = test_image();
        let mut store = VariableStore::load(&image).unwrap();

        // attributes are not needed, and the guid is the owner
        let mut req = request(VarOperation::Add, "db", Some(b"cert"));
        req.attributes = None;
        req.apply(&mut store).unwrap();

        let db = store
            .find(&"db".into(), vars::IMAGE_SECURITY_DATABASE_GUID)
            .unwrap();
        assert_eq!(&db.data[28..44], &<[u8; 16]>::from(VENDOR));

        assert!(matches!(
            request(VarOperation::Append, "PK", Some(b"cert")).apply(&mut store),
            Err(Error::OperationRejected(Rejected::AppendToPk))
        ));

        request(VarOperation::Delete, "DB", None)
            .apply(&mut store)
            .unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn update_pk() {
        let image = test_image();
        let mut store = VariableStore::load(&image).unwrap();
        request(VarOperation::Add, "PK", Some(b"old"))
            .apply(&mut store)
            .unwrap();
        request(VarOperation::Update, "PK", Some(b"newer"))
            .apply(&mut store)
            .unwrap();
        assert_eq!(
            store
                .find(&"PK".into(), vars::EFI_GLOBAL_VARIABLE)
                .unwrap()
                .data
                .len(),
            28 + 16 + 5
        );
    }

    #[test]
    fn command_writes_output_only() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("OVMF.fd");
        let output = dir.path().join("OVMF.out.fd");
        let data = dir.path().join("setup.bin");
        fs_err::write(&source, test_image()).unwrap();
        fs_err::write(&data, b"payload").unwrap();

        let mut cmd = VarCommand {
            source: source.clone(),
            output: output.clone(),
            operation: VarOperation::Add,
            name: "Setup".into(),
            guid: VENDOR.to_string().to_uppercase(),
            attributes: Some("0x7".into()),
            data_file: Some(data),
        };
        cmd.run().unwrap();

        assert_eq!(fs_err::read(&source).unwrap(), test_image());
        let out = fs_err::read(&output).unwrap();
        let store = VariableStore::load(&out).unwrap();
        assert_eq!(store.find(&"Setup".into(), VENDOR).unwrap().data, b"payload");

        cmd.guid = "11111111-1111-1111-1111-111111111111".into();
        assert!(matches!(
            cmd.run(),
            Err(Error::OperationRejected(Rejected::InvalidGuid(..)))
        ));

        cmd.guid = VENDOR.to_string();
        cmd.source = dir.path().join("missing.fd");
        assert!(matches!(cmd.run(), Err(Error::InputNotFound(p)) if p == cmd.source));
    }
}
