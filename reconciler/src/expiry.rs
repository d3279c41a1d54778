// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compliance expiration of dated image versions
//!
//! Linux node image versions are dated: `YYYYMM.DD.PATCH` (for example
//! `202410.09.0` is the first build published on 2024-10-09).  Policy forbids
//! provisioning nodes from an image more than 90 days old.  Versions in any
//! other scheme (notably the Windows build-number scheme) are not evaluated
//! yet and never report as expired.

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveTime;
use chrono::TimeDelta;
use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// How old a dated version may be before nodes must stop using it
const EXPIRATION_PERIOD: TimeDelta = TimeDelta::days(90);

/// Slack past the 90-day mark before we act on the expiration
///
/// A version at exactly the policy boundary is still racing provisioning
/// paths that captured the image list moments earlier; the margin keeps the
/// transition off the exact boundary.
const EXPIRATION_MARGIN: TimeDelta = TimeDelta::minutes(30);

static DATED_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})(\d{2})\.(\d{2})\.\d+$")
        .expect("dated version pattern is valid")
});

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error(
    "dated version {version:?} matched the expected pattern but does not \
     name a valid calendar date"
)]
pub struct ExpiryError {
    pub version: String,
}

/// Reports whether a dated image version is past its compliance deadline
///
/// A version that does not match the dated pattern is reported as not
/// expired with no error.  A version exactly `90 days + 30 minutes` old is
/// not expired; one second older is.
pub fn version_expired(
    version: &str,
    now: DateTime<Utc>,
) -> Result<bool, ExpiryError> {
    let Some(captures) = DATED_VERSION.captures(version) else {
        return Ok(false);
    };

    // The pattern guarantees these are short digit runs, so the integer
    // parses cannot fail; a nonsense month or day still can.
    let field = |i: usize| {
        captures[i].parse::<u32>().map_err(|_| ExpiryError {
            version: version.to_string(),
        })
    };
    let (year, month, day) = (field(1)?, field(2)?, field(3)?);
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(year)
            .map_err(|_| ExpiryError { version: version.to_string() })?,
        month,
        day,
    )
    .ok_or_else(|| ExpiryError { version: version.to_string() })?
    .and_time(NaiveTime::MIN)
    .and_utc();

    Ok(now.signed_duration_since(date) > EXPIRATION_PERIOD + EXPIRATION_MARGIN)
}
