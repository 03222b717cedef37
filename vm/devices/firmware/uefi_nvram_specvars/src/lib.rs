// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//!  UEFI NVRAM structures.

#![expect(missing_docs)]

use thiserror::Error;

pub mod auth_payload;
pub mod signature_list;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("parsing signature list")]
    SignatureList(#[from] signature_list::ParseError),
    #[error("SecureBootEnable must hold exactly one byte, found {0}")]
    SecureBootEnable(usize),
}

#[derive(Debug)]
pub enum ParsedNvramEntry<'a> {
    SignatureList(Vec<signature_list::SignatureList<'a>>),
    SecureBootEnable(bool),
    Unknown(&'a [u8]),
}

/// Decode the payload of a well-known secure boot variable for display.
pub fn parse_nvram_entry<'a>(
    name: &str,
    data: &'a [u8],
) -> Result<ParsedNvramEntry<'a>, ParseError> {
    use uefi_specs::edk2::SECURE_BOOT_ENABLE_NAME;
    use uefi_specs::uefi::nvram::vars;

    Ok(match name {
        vars::PK | vars::KEK | vars::DB | vars::DBX | "dbDefault" => {
            ParsedNvramEntry::SignatureList(
                signature_list::ParseSignatureLists::new(data).collect::<Result<_, _>>()?,
            )
        }
        SECURE_BOOT_ENABLE_NAME => match data {
            [flag] => ParsedNvramEntry::SecureBootEnable(*flag != 0),
            _ => return Err(ParseError::SecureBootEnable(data.len())),
        },
        _ => ParsedNvramEntry::Unknown(data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use signature_list::SignatureList;

    #[test]
    fn secure_boot_enable_flag() {
        assert!(matches!(
            parse_nvram_entry("SecureBootEnable", &[1]),
            Ok(ParsedNvramEntry::SecureBootEnable(true))
        ));
        assert!(matches!(
            parse_nvram_entry("SecureBootEnable", &[1, 0]),
            Err(ParseError::SecureBootEnable(2))
        ));
    }

    #[test]
    fn kek_is_signature_list() {
        let mut buf = Vec::new();
        SignatureList::new_x509(guid::Guid::ZERO, b"cert"[..].into())
            .extend_as_spec_signature_list(&mut buf);

        match parse_nvram_entry("KEK", &buf).unwrap() {
            ParsedNvramEntry::SignatureList(lists) => assert_eq!(lists.len(), 1),
            other => panic!("unexpected entry {other:?}"),
        }
        assert!(matches!(
            parse_nvram_entry("Lang", &buf),
            Ok(ParsedNvramEntry::Unknown(_))
        ));
    }
}
