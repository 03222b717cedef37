// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The enrollment configuration: which GUID and source file to use for each
//! secure boot variable.

use guid::Guid;
use serde::Deserialize;
use serde::Deserializer;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

/// Owner GUID Microsoft uses for the certificates it publishes.
pub const MICROSOFT_OWNER_GUID: Guid =
    Guid::from_static_str("77fa9abd-0359-4d32-bd60-28f4e78f784b");

/// Errors loading an [`EnrollmentConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration")]
    Read(#[source] std::io::Error),
    /// Invalid JSON, an unknown key or a bad GUID.
    #[error("malformed configuration")]
    Parse(#[from] serde_json::Error),
    /// Mandatory entries are absent.
    #[error("configuration is missing {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

/// A GUID and the file holding the matching payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeySource {
    /// Certificate owner for PK, KEK and db; vendor GUID for
    /// SecureBootEnable. Unused for dbx.
    #[serde(deserialize_with = "parse_guid")]
    pub guid: Guid,
    /// Payload file.
    #[serde(rename = "file")]
    pub path: PathBuf,
}

fn parse_guid<'de, D: Deserializer<'de>>(d: D) -> Result<Guid, D::Error> {
    let s = String::deserialize(d)?;
    Guid::parse_canonical(&s.to_ascii_lowercase())
        .map_err(|e| serde::de::Error::custom(format!("invalid guid {s:?}: {e}")))
}

/// A configuration in which any entry may still be missing.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    /// See [`EnrollmentConfig::pk`].
    #[serde(rename = "PK")]
    pub pk: Option<KeySource>,
    /// See [`EnrollmentConfig::kek`].
    #[serde(rename = "KEK")]
    pub kek: Option<KeySource>,
    /// See [`EnrollmentConfig::db`].
    pub db: Option<KeySource>,
    /// See [`EnrollmentConfig::dbx`].
    pub dbx: Option<KeySource>,
    /// See [`EnrollmentConfig::secure_boot_enable`].
    #[serde(rename = "SecureBootEnable")]
    pub secure_boot_enable: Option<KeySource>,
}

impl PartialConfig {
    /// Check that every mandatory entry is present.
    pub fn validate(self) -> Result<EnrollmentConfig, ConfigError> {
        let Self {
            pk,
            kek,
            db,
            dbx,
            secure_boot_enable,
        } = self;

        match (pk, kek, db, secure_boot_enable) {
            (Some(pk), Some(kek), Some(db), Some(secure_boot_enable)) => Ok(EnrollmentConfig {
                pk,
                kek,
                db,
                dbx,
                secure_boot_enable,
            }),
            (pk, kek, db, sbe) => {
                let missing = [
                    ("PK", pk.is_none()),
                    ("KEK", kek.is_none()),
                    ("db", db.is_none()),
                    ("SecureBootEnable", sbe.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, missing)| missing.then_some(name))
                .collect();
                Err(ConfigError::Missing(missing))
            }
        }
    }
}

/// A complete enrollment configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentConfig {
    /// Platform key certificate.
    pub pk: KeySource,
    /// Key exchange key certificate.
    pub kek: KeySource,
    /// Allowed database certificate.
    pub db: KeySource,
    /// Optional signed dbx update.
    pub dbx: Option<KeySource>,
    /// SecureBootEnable flag contents.
    pub secure_boot_enable: KeySource,
}

impl EnrollmentConfig {
    /// Load a JSON configuration file. Relative paths in it are taken
    /// relative to the file's directory.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let s = fs_err::read_to_string(path).map_err(ConfigError::Read)?;
        let base = path.parent().unwrap_or(Path::new(""));
        Self::from_json_str(&s, base)
    }

    /// Parse a JSON configuration, resolving relative paths against
    /// `base_dir`.
    pub fn from_json_str(s: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let partial: PartialConfig = serde_json::from_str(s)?;
        let mut config = partial.validate()?;
        for source in config.sources_mut() {
            if source.path.is_relative() {
                source.path = base_dir.join(&source.path);
            }
        }
        Ok(config)
    }

    fn sources_mut(&mut self) -> impl Iterator<Item = &mut KeySource> {
        [&mut self.pk, &mut self.kek, &mut self.db, &mut self.secure_boot_enable]
            .into_iter()
            .chain(self.dbx.as_mut())
    }
}
