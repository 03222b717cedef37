// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Types and constants describing the on-disk structures found in a UEFI
//! firmware image.
//!
//! This crate is divided into 3 submodules:
//!
//! - `uefi`: types directly lifted from the official UEFI spec
//! - `pi`: types from the Platform Initialization spec (firmware volumes)
//! - `edk2`: types specific to the EDK2 variable store implementation

#![no_std]
#![expect(missing_docs)]
#![allow(non_camel_case_types)]

pub mod edk2;
pub mod pi;
pub mod uefi;
