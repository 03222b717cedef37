// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Conversion from wall-clock time to the `EFI_TIME` stamped on
//! time-based authenticated variables.

use time::OffsetDateTime;
use time::UtcOffset;
use uefi_specs::uefi::time::EFI_TIME;

/// The current UTC time, truncated to whole seconds.
pub fn now() -> EFI_TIME {
    from_datetime(OffsetDateTime::now_utc())
}

/// Convert `datetime` to a GMT `EFI_TIME`, dropping sub-second precision.
pub fn from_datetime(datetime: OffsetDateTime) -> EFI_TIME {
    let utc = datetime.to_offset(UtcOffset::UTC);
    EFI_TIME::new_utc(
        utc.year() as u16,
        utc.month().into(),
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second(),
    )
}
