// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Full secure boot enrollment of an FD image.
//!
//! Each stage reads the previous stage's image and writes a new file next to
//! the source, named by appending the stage suffix (`OVMF.fd.pk`,
//! `OVMF.fd.pk.kek`, ...). The last file is copied to the output path. All
//! intermediate files are removed when the run ends, whether or not it
//! succeeded.

use crate::config::EnrollmentConfig;
use crate::keys::enroll_certificate;
use crate::keys::enroll_secure_boot_enable;
use crate::keys::enroll_signed_update;
use crate::keys::SecureBootKey;
use crate::read_input;
use crate::Error;
use fd_varstore::VariableStore;
use std::io;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Stage {
    Pk,
    Kek,
    Db,
    Dbx,
    SecureBootEnable,
}

impl Stage {
    const ALL: [Stage; 5] = [
        Stage::Pk,
        Stage::Kek,
        Stage::Db,
        Stage::Dbx,
        Stage::SecureBootEnable,
    ];

    fn suffix(self) -> &'static str {
        match self {
            Stage::Pk => "pk",
            Stage::Kek => "kek",
            Stage::Db => "db",
            Stage::Dbx => "dbx",
            Stage::SecureBootEnable => "sb",
        }
    }

    fn output_path(self, input: &Path) -> PathBuf {
        let mut path = input.as_os_str().to_owned();
        path.push(".");
        path.push(self.suffix());
        path.into()
    }

    /// Produce the stage's output image from the image at `input`.
    fn run(self, config: &EnrollmentConfig, input: &Path) -> Result<Vec<u8>, Error> {
        let image = read_input(input)?;
        let dbx = match (self, &config.dbx) {
            (Stage::Dbx, None) => {
                tracing::info!("no dbx update configured, skipping");
                return Ok(image);
            }
            (_, dbx) => dbx,
        };

        let mut store = VariableStore::load(&image)?;
        match self {
            Stage::Pk => enroll_certificate(
                &mut store,
                SecureBootKey::Pk,
                config.pk.guid,
                &read_input(&config.pk.path)?,
                false,
            )?,
            Stage::Kek => enroll_certificate(
                &mut store,
                SecureBootKey::Kek,
                config.kek.guid,
                &read_input(&config.kek.path)?,
                true,
            )?,
            Stage::Db => enroll_certificate(
                &mut store,
                SecureBootKey::Db,
                config.db.guid,
                &read_input(&config.db.path)?,
                true,
            )?,
            Stage::Dbx => {
                if let Some(dbx) = dbx {
                    enroll_signed_update(
                        &mut store,
                        SecureBootKey::Dbx,
                        &read_input(&dbx.path)?,
                        false,
                    )?
                }
            }
            Stage::SecureBootEnable => enroll_secure_boot_enable(
                &mut store,
                config.secure_boot_enable.guid,
                &read_input(&config.secure_boot_enable.path)?,
            )?,
        }

        Ok(store.serialize(&image)?)
    }
}

/// Files that are removed when dropped.
#[derive(Default)]
struct IntermediateFiles(Vec<PathBuf>);

impl IntermediateFiles {
    /// Track `path`. Called just before the file is written, so a file that
    /// was never written by this run is left alone.
    fn register(&mut self, path: PathBuf) -> &Path {
        self.0.push(path);
        &self.0[self.0.len() - 1]
    }
}

impl Drop for IntermediateFiles {
    fn drop(&mut self) {
        for path in self.0.drain(..) {
            match fs_err::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed intermediate image"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    error = &e as &dyn std::error::Error,
                    "failed to remove intermediate image"
                ),
            }
        }
    }
}

/// Enroll PK, KEK, db, the optional dbx update and SecureBootEnable into
/// `source`, writing the result to `output`.
///
/// `source` is only read. On failure `output` is not written.
pub fn enroll_image(source: &Path, output: &Path, config: &EnrollmentConfig) -> Result<(), Error> {
    let mut intermediates = IntermediateFiles::default();
    let mut input = source.to_owned();

    for stage in Stage::ALL {
        tracing::info!(?stage, input = %input.display(), "enrollment stage");
        let image = stage.run(config, &input).inspect_err(|e| {
            tracing::error!(
                ?stage,
                error = e as &dyn std::error::Error,
                "enrollment stage failed"
            )
        })?;
        let next = intermediates.register(stage.output_path(&input));
        fs_err::write(next, image)?;
        input = next.to_owned();
    }

    fs_err::copy(&input, output)?;
    tracing::info!(output = %output.display(), "secure boot enrollment complete");
    Ok(())
}
