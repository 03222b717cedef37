// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Implements a command line utility to edit TDVF firmware images: UEFI
//! variables, secure boot enrollment and the TDX metadata offset.

mod info;

use anyhow::Context;
use clap::Parser;
use secure_boot_enroll::variable_ops::VarCommand;
use secure_boot_enroll::variable_ops::VarOperation;
use secure_boot_enroll::EnrollmentConfig;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "tdvf_fdtool", about = "Tool to edit TDVF firmware images")]
struct Options {
    /// Log at debug level when RUST_LOG is not set
    #[clap(short, long, global = true)]
    verbose: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Add, append, update or delete a single UEFI variable
    Var {
        /// Firmware image to read
        #[clap(long)]
        fd: PathBuf,
        /// One of add, append, update or delete
        #[clap(long)]
        operation: VarOperation,
        /// Variable name. PK, KEK, db and dbx take a certificate (or a
        /// signed update for dbx) and a fixed vendor GUID.
        #[clap(long)]
        name: String,
        /// Vendor GUID, or the certificate owner for PK, KEK and db
        #[clap(long)]
        guid: String,
        /// Attribute mask in hex, for variables other than PK, KEK, db and
        /// dbx
        #[clap(long)]
        attributes: Option<String>,
        /// File holding the variable data
        #[clap(long)]
        data_file: Option<PathBuf>,
        /// Output file path for the edited image
        #[clap(short = 'o', long)]
        output: PathBuf,
    },
    /// Print the variable store and its variables
    Info {
        /// Firmware image to read
        #[clap(long)]
        fd: PathBuf,
    },
    /// Enroll PK, KEK, db, dbx and SecureBootEnable from a JSON config
    Enroll {
        /// Firmware image to read
        #[clap(long)]
        fd: PathBuf,
        /// Enrollment configuration
        #[clap(long)]
        config: PathBuf,
        /// Output file path for the enrolled image
        #[clap(short = 'o', long)]
        output: PathBuf,
    },
    /// Point the image's metadata offset slot at the TDVF descriptor
    InjectMetadata {
        /// Firmware image to patch
        #[clap(long)]
        fd: PathBuf,
        /// Output file path. The image is patched in place if not given.
        #[clap(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// Print the TDVF metadata descriptor
    DumpMetadata {
        /// Firmware image to read
        #[clap(long)]
        fd: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let opts = Options::parse();
    let level = if opts.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::default().add_directive(level.into())
    };
    tracing_subscriber::fmt()
        .log_internal_errors(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    match opts.command {
        Command::Var {
            fd,
            operation,
            name,
            guid,
            attributes,
            data_file,
            output,
        } => {
            VarCommand {
                source: fd,
                output,
                operation,
                name,
                guid,
                attributes,
                data_file,
            }
            .run()
            .context("variable operation failed")?;
        }
        Command::Info { fd } => {
            let image = fs_err::read(fd).context("reading firmware image")?;
            info::dump_store(&image, &mut std::io::stdout().lock())?;
        }
        Command::Enroll { fd, config, output } => {
            let config = EnrollmentConfig::from_json_file(&config)
                .context("loading enrollment configuration")?;
            secure_boot_enroll::enroll_image(&fd, &output, &config)
                .context("secure boot enrollment failed")?;
        }
        Command::InjectMetadata { fd, output } => {
            tdvf_metadata::inject_file(&fd, output.as_deref())
                .context("injecting metadata offset")?;
        }
        Command::DumpMetadata { fd } => {
            let image = fs_err::read(fd).context("reading firmware image")?;
            let (offset, table) =
                tdvf_metadata::read_descriptor(&image).context("reading metadata descriptor")?;
            println!("metadata offset: {offset:#010x}");
            print!("{table}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_command() {
        let opts = Options::try_parse_from([
            "tdvf_fdtool",
            "var",
            "--fd",
            "OVMF.fd",
            "--operation",
            "append",
            "--name",
            "db",
            "--guid",
            "77fa9abd-0359-4d32-bd60-28f4e78f784b",
            "--data-file",
            "db.cer",
            "-o",
            "OVMF.out.fd",
            "--verbose",
        ])
        .unwrap();
        assert!(opts.verbose);
        match opts.command {
            Command::Var {
                operation,
                attributes,
                data_file,
                ..
            } => {
                assert_eq!(operation, VarOperation::Append);
                assert_eq!(attributes, None);
                assert_eq!(data_file, Some(PathBuf::from("db.cer")));
            }
            _ => panic!("expected var command"),
        }
    }

    #[test]
    fn reject_unknown_operation() {
        assert!(Options::try_parse_from([
            "tdvf_fdtool",
            "var",
            "--fd",
            "OVMF.fd",
            "--operation",
            "replace",
            "--name",
            "Setup",
            "--guid",
            "77fa9abd-0359-4d32-bd60-28f4e78f784b",
            "-o",
            "out.fd",
        ])
        .is_err());
    }

    #[test]
    fn inject_output_is_optional() {
        let opts =
            Options::try_parse_from(["tdvf_fdtool", "inject-metadata", "--fd", "TDVF.fd"]).unwrap();
        assert!(matches!(
            opts.command,
            Command::InjectMetadata { output: None, .. }
        ));
    }
}
