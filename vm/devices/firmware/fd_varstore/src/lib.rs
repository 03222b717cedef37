// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Offline editor for the UEFI variable store embedded in a flat firmware
//! (FD) image.
//!
//! The store is found by scanning the image for the NVRAM firmware volume
//! ([`NvramVolume::locate`]), decoded into an in-memory list of
//! time-based authenticated variables ([`VariableStore::load`]), mutated, and
//! written back into a copy of the image ([`VariableStore::serialize`]).
//!
//! Only stores using the EDK2 time-based authenticated record layout are
//! supported. The other known layouts are detected and rejected.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod blank;
mod name;
mod record;
mod store;
pub mod timestamp;
mod volume;

pub use blank::blank_nvram_volume;
pub use name::VariableName;
pub use record::Variable;
pub use store::StoreVariant;
pub use store::VariableStore;
pub use volume::NvramVolume;

use thiserror::Error;

/// Errors returned while locating, decoding or re-encoding a variable store.
#[derive(Debug, Error)]
pub enum Error {
    /// No NVRAM firmware volume was found, or the first one found declares
    /// lengths inconsistent with the image.
    #[error("no NVRAM firmware volume found in image")]
    VolumeNotFound,
    /// The volume is too short to hold a variable store header.
    #[error("variable store header is truncated")]
    TruncatedStoreHeader,
    /// The store uses a record layout other than time-based authenticated.
    #[error("unsupported variable store variant: {0}")]
    UnsupportedVariant(StoreVariant),
    /// The store header declares a size that does not fit the volume.
    #[error("variable store size {size:#x} does not fit in the {available:#x} bytes available")]
    StoreSize {
        /// Declared store size, including the store header.
        size: u32,
        /// Bytes between the store header and the end of the volume.
        available: usize,
    },
    /// The encoded variables do not fit in the store.
    #[error("variables need {needed:#x} bytes but the store holds {capacity:#x}")]
    RegionOverflow {
        /// Encoded size of all variables.
        needed: usize,
        /// Size of the variable region.
        capacity: usize,
    },
    /// The image handed to [`VariableStore::serialize`] does not contain the
    /// store's region.
    #[error("image of {len:#x} bytes does not contain the variable region ending at {end:#x}")]
    ImageTooSmall {
        /// Image length.
        len: usize,
        /// End of the variable region.
        end: usize,
    },
}
