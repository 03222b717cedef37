// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Human-readable dump of an image's variable store.

use anyhow::Context;
use fd_varstore::StoreVariant;
use fd_varstore::VariableStore;
use std::io::Write;
use uefi_nvram_specvars::parse_nvram_entry;
use uefi_nvram_specvars::ParsedNvramEntry;
use uefi_specs::edk2::variable::VARIABLE_STORE_HEADER;

pub fn dump_store(image: &[u8], out: &mut impl Write) -> anyhow::Result<()> {
    let store = VariableStore::load(image).context("loading variable store")?;
    let volume = store.volume();
    let header = store.header();

    writeln!(
        out,
        "NVRAM volume at {:#x}, {:#x} bytes",
        volume.offset(),
        volume.range().len()
    )?;
    writeln!(out, "Signature  : {}", header.signature)?;
    writeln!(
        out,
        "Variant    : {}",
        StoreVariant::from_signature(header.signature)
    )?;
    writeln!(out, "Format     : {:#04x}", header.format)?;
    writeln!(out, "State      : {:#04x}", header.state)?;
    writeln!(
        out,
        "HeaderSize : {:#x}",
        size_of::<VARIABLE_STORE_HEADER>()
    )?;
    writeln!(out, "Size       : {:#x}", header.size)?;
    writeln!(
        out,
        "Used       : {:#x} of {:#x}",
        store.used(),
        store.capacity()
    )?;
    writeln!(out, "Variables  : {}", store.len())?;

    for var in store.iter() {
        writeln!(out)?;
        writeln!(out, "{} ({})", var.name, var.vendor)?;
        writeln!(
            out,
            "  size: {:#x}, attributes: {:#x}, state: {:#04x}, monotonic count: {}, pubkey index: {}, timestamp: {}",
            var.data.len(),
            u32::from(var.attributes),
            var.state,
            var.monotonic_count,
            var.pubkey_index,
            var.timestamp,
        )?;

        match parse_nvram_entry(&var.name.to_string(), &var.data) {
            Ok(ParsedNvramEntry::SignatureList(lists)) => {
                for list in &lists {
                    for sig in &list.signatures {
                        writeln!(
                            out,
                            "  {}: owner {}, {:#x} bytes",
                            list.type_name(),
                            sig.header.signature_owner,
                            sig.data.len()
                        )?;
                    }
                }
            }
            Ok(ParsedNvramEntry::SecureBootEnable(enabled)) => {
                writeln!(out, "  secure boot enabled: {enabled}")?;
            }
            Ok(ParsedNvramEntry::Unknown(_)) => {}
            Err(e) => {
                tracing::warn!(
                    name = %var.name,
                    error = &e as &dyn std::error::Error,
                    "failed to decode variable"
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fd_varstore::blank_nvram_volume;
    use guid::Guid;
    use secure_boot_enroll::keys::enroll_certificate;
    use secure_boot_enroll::keys::enroll_secure_boot_enable;
    use secure_boot_enroll::keys::SecureBootKey;
    use uefi_specs::edk2::SECURE_BOOT_ENABLE_DISABLE_GUID;

    const OWNER: Guid = Guid::from_static_str("77fa9abd-0359-4d32-bd60-28f4e78f784b");

    #[test]
    fn dump_enrolled_store() {
        let image = blank_nvram_volume(0x10000, 0x8000);
        let mut store = VariableStore::load(&image).unwrap();
        enroll_certificate(&mut store, SecureBootKey::Pk, OWNER, &[0x30; 0x100], false).unwrap();
        enroll_secure_boot_enable(&mut store, SECURE_BOOT_ENABLE_DISABLE_GUID, &[1]).unwrap();
        let image = store.serialize(&image).unwrap();

        let mut out = Vec::new();
        dump_store(&image, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("Variables  : 2"), "{out}");
        assert!(out.contains("PK (8be4df61-93ca-11d2-aa0d-00e098032b8c)"), "{out}");
        assert!(
            out.contains("  x509: owner 77fa9abd-0359-4d32-bd60-28f4e78f784b, 0x100 bytes"),
            "{out}"
        );
        assert!(out.contains("SecureBootEnable (f0a30bc7-af08-4556-99c4-001009c93a44)"), "{out}");
        assert!(out.contains("  secure boot enabled: true"), "{out}");
    }

    #[test]
    fn no_store() {
        let mut out = Vec::new();
        assert!(dump_store(&[0xff; 0x1000], &mut out).is_err());
        assert!(out.is_empty());
    }
}
