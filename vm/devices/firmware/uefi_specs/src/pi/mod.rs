// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Type definitions from the UEFI Platform Initialization spec, Volume 3.

pub mod firmware_volume;
