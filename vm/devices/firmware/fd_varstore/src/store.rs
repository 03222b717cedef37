// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::record::Scan;
use crate::record::PAD_BYTE;
use crate::timestamp;
use crate::Error;
use crate::NvramVolume;
use crate::Variable;
use crate::VariableName;
use guid::Guid;
use std::fmt;
use std::ops::Range;
use uefi_specs::edk2::variable::VARIABLE_STORE_HEADER;
use uefi_specs::edk2::variable::EFI_AUTHENTICATED_VARIABLE_BASED_TIME_GUID;
use uefi_specs::edk2::variable::EFI_AUTHENTICATED_VARIABLE_GUID;
use uefi_specs::edk2::variable::EFI_VARIABLE_GUID;
use uefi_specs::uefi::nvram::EfiVariableAttributes;
use uefi_specs::uefi::time::EFI_TIME;
use zerocopy::FromBytes;

/// Record layout selected by the variable store signature.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StoreVariant {
    /// `gEfiVariableGuid`
    Plain,
    /// `gEfiAuthenticatedVariableGuid`
    Authenticated,
    /// `gEfiAuthenticatedVariableBasedTimeGuid`
    TimeBasedAuthenticated,
    /// Any other signature.
    Unknown(Guid),
}

impl StoreVariant {
    /// Classify a store signature GUID.
    pub fn from_signature(signature: Guid) -> Self {
        match signature {
            EFI_VARIABLE_GUID => Self::Plain,
            EFI_AUTHENTICATED_VARIABLE_GUID => Self::Authenticated,
            EFI_AUTHENTICATED_VARIABLE_BASED_TIME_GUID => Self::TimeBasedAuthenticated,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for StoreVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("plain"),
            Self::Authenticated => f.write_str("authenticated"),
            Self::TimeBasedAuthenticated => f.write_str("time-based authenticated"),
            Self::Unknown(guid) => write!(f, "unknown ({guid})"),
        }
    }
}

/// An in-memory copy of the variables held in an FD image's NVRAM store.
///
/// The list only holds the leading run of live records: decoding stops at
/// the first record that is not in the added state, at the first missing
/// start marker, or at the end of the region, and anything past that point
/// is discarded on [`serialize`](Self::serialize).
#[derive(Debug, Clone)]
pub struct VariableStore {
    volume: NvramVolume,
    header: VARIABLE_STORE_HEADER,
    variables: Vec<Variable>,
}

impl VariableStore {
    /// Locate the NVRAM volume in `image` and decode its variable store.
    pub fn load(image: &[u8]) -> Result<Self, Error> {
        let volume = NvramVolume::locate(image)?;
        Self::from_volume(image, volume)
    }

    /// Decode the variable store held in an already located volume.
    pub fn from_volume(image: &[u8], volume: NvramVolume) -> Result<Self, Error> {
        let body = image
            .get(volume.body_offset()..volume.range().end)
            .ok_or(Error::ImageTooSmall {
                len: image.len(),
                end: volume.range().end,
            })?;
        let (header, _) = VARIABLE_STORE_HEADER::read_from_prefix(body)
            .map_err(|_| Error::TruncatedStoreHeader)?;

        match StoreVariant::from_signature(header.signature) {
            StoreVariant::TimeBasedAuthenticated => {}
            variant => return Err(Error::UnsupportedVariant(variant)),
        }

        if (header.size as usize) < size_of::<VARIABLE_STORE_HEADER>()
            || header.size as usize > body.len()
        {
            return Err(Error::StoreSize {
                size: header.size,
                available: body.len(),
            });
        }

        let mut store = VariableStore {
            volume,
            header,
            variables: Vec::new(),
        };

        let mut region = &image[store.region()];
        loop {
            match Variable::scan(region) {
                Scan::Record(variable, len) => {
                    tracing::trace!(
                        name = %variable.name,
                        vendor = %variable.vendor,
                        len,
                        "loaded variable"
                    );
                    store.variables.push(variable);
                    region = &region[len..];
                }
                Scan::End(end) => {
                    tracing::debug!(
                        ?end,
                        remaining = region.len(),
                        count = store.variables.len(),
                        "end of variable list"
                    );
                    break;
                }
            }
        }

        Ok(store)
    }

    /// The volume hosting the store.
    pub fn volume(&self) -> &NvramVolume {
        &self.volume
    }

    /// The store header, as loaded.
    pub fn header(&self) -> &VARIABLE_STORE_HEADER {
        &self.header
    }

    /// Absolute byte range of the variable records in the image: from the end
    /// of the store header to the end of the store's declared size.
    pub fn region(&self) -> Range<usize> {
        let start = self.volume.body_offset();
        start + size_of::<VARIABLE_STORE_HEADER>()..start + self.header.size as usize
    }

    /// Size of the variable region.
    pub fn capacity(&self) -> usize {
        self.region().len()
    }

    /// Bytes the current variables need once encoded.
    pub fn used(&self) -> usize {
        self.variables.iter().map(Variable::encoded_len).sum()
    }

    /// Iterate over the variables in store order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    /// The number of variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns true if the store holds no variables.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    fn position(&self, name: &VariableName, vendor: Guid) -> Option<usize> {
        self.variables
            .iter()
            .position(|v| v.name == *name && v.vendor == vendor)
    }

    /// Find the first variable with exactly this name and vendor.
    pub fn find(&self, name: &VariableName, vendor: Guid) -> Option<&Variable> {
        self.position(name, vendor).map(|i| &self.variables[i])
    }

    /// Set a variable.
    ///
    /// If the variable exists, `data` either replaces its payload or, with
    /// `append`, is concatenated to it; the attributes and timestamp are
    /// replaced in both cases. Otherwise a new variable is added at the end
    /// of the list.
    ///
    /// Without an explicit `timestamp`, time-based authenticated variables
    /// get the current UTC time and all others a zeroed timestamp.
    ///
    /// Fails with [`Error::RegionOverflow`], leaving the store unchanged, if
    /// the result would no longer fit in the region.
    pub fn add(
        &mut self,
        name: &VariableName,
        vendor: Guid,
        attributes: EfiVariableAttributes,
        timestamp: Option<EFI_TIME>,
        data: &[u8],
        append: bool,
    ) -> Result<(), Error> {
        let timestamp = match timestamp {
            Some(timestamp) => timestamp,
            None if attributes.time_based_authenticated_write_access() => timestamp::now(),
            None => EFI_TIME::ZEROED,
        };

        let index = self.position(name, vendor);
        let var = match index {
            Some(i) => {
                let mut var = self.variables[i].clone();
                if append {
                    var.data.extend_from_slice(data);
                } else {
                    var.data = data.to_vec();
                }
                var.attributes = attributes;
                var.timestamp = timestamp;
                var
            }
            None => Variable::new(name.clone(), vendor, attributes, timestamp, data.to_vec()),
        };

        let replaced = index.map_or(0, |i| self.variables[i].encoded_len());
        let needed = self.used() - replaced + var.encoded_len();
        if needed > self.capacity() {
            return Err(Error::RegionOverflow {
                needed,
                capacity: self.capacity(),
            });
        }

        tracing::debug!(
            %name,
            %vendor,
            attributes = u32::from(attributes),
            len = var.data.len(),
            append,
            new = index.is_none(),
            "set variable"
        );
        match index {
            Some(i) => self.variables[i] = var,
            None => self.variables.push(var),
        }
        Ok(())
    }

    /// Remove the first variable with this name and vendor. Returns false if
    /// there is none.
    pub fn delete(&mut self, name: &VariableName, vendor: Guid) -> bool {
        match self.position(name, vendor) {
            Some(i) => {
                self.variables.remove(i);
                tracing::debug!(%name, %vendor, "deleted variable");
                true
            }
            None => false,
        }
    }

    /// Produce a copy of `image` with the variable region rewritten from the
    /// current variable list. Bytes outside the region are left as they are.
    pub fn serialize(&self, image: &[u8]) -> Result<Vec<u8>, Error> {
        let region = self.region();
        if image.len() < region.end {
            return Err(Error::ImageTooSmall {
                len: image.len(),
                end: region.end,
            });
        }

        let mut records = Vec::with_capacity(self.used());
        for var in &self.variables {
            var.extend_encoded(&mut records);
        }
        if records.len() > region.len() {
            return Err(Error::RegionOverflow {
                needed: records.len(),
                capacity: region.len(),
            });
        }

        let mut out = image.to_vec();
        let dest = &mut out[region];
        dest.fill(PAD_BYTE);
        dest[..records.len()].copy_from_slice(&records);
        Ok(out)
    }
}
