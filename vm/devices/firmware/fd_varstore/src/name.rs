// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

/// The raw on-disk name of a variable: UCS-2 little-endian code units
/// followed by a NUL code unit.
///
/// Variables are matched on these exact bytes, so names are case sensitive.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VariableName(Vec<u8>);

impl VariableName {
    /// Wrap a name blob read from a variable record. The bytes are taken as
    /// is, whether or not they are well formed.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The name blob, including the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode the name up to its terminator, replacing unpaired surrogates.
    pub fn to_string_lossy(&self) -> String {
        let units = self
            .0
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&c| c != 0);
        char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

impl From<&str> for VariableName {
    fn from(name: &str) -> Self {
        let mut bytes = Vec::with_capacity((name.len() + 1) * 2);
        for unit in name.encode_utf16().chain([0]) {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        Self(bytes)
    }
}

impl fmt::Display for VariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for VariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}
