// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Maintenance-window gate for non-mandatory rollouts

use chrono::DateTime;
use chrono::Utc;
use nodepool_image_types::window_end_key;
use nodepool_image_types::window_start_key;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WindowGateError {
    #[error(
        "maintenance window for channel {channel:?} is incomplete: \
         exactly one of start/end is configured"
    )]
    Incomplete { channel: String },

    #[error(
        "maintenance window entry {key:?} has malformed timestamp {value:?}"
    )]
    MalformedTimestamp {
        key: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Reports whether non-mandatory image rollouts are currently permitted
///
/// `schedule` is the raw keyed schedule data for this configuration, or
/// `None` if the schedule store has no data at all (including a not-found
/// response from the store, which the caller maps to `None`).  Absent data
/// fails open: an administrator who has not scheduled maintenance has not
/// forbidden updates.  Present-but-broken data is a hard error so that we
/// never guess at an administrator's intent.
///
/// Bounds are exclusive: at `now == start` and `now == end` the window is
/// closed.
pub fn rollout_permitted(
    schedule: Option<&BTreeMap<String, String>>,
    channel: &str,
    now: DateTime<Utc>,
) -> Result<bool, WindowGateError> {
    let Some(schedule) = schedule else {
        return Ok(true);
    };

    let start_key = window_start_key(channel);
    let end_key = window_end_key(channel);
    let (start, end) =
        match (schedule.get(&start_key), schedule.get(&end_key)) {
            (None, None) => return Ok(true),
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(WindowGateError::Incomplete {
                    channel: channel.to_string(),
                });
            }
        };

    let parse = |key: &str, value: &str| {
        DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|source| WindowGateError::MalformedTimestamp {
                key: key.to_string(),
                value: value.to_string(),
                source,
            })
    };
    let start = parse(&start_key, start)?;
    let end = parse(&end_key, end)?;

    Ok(start < now && now < end)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use nodepool_image_types::NODE_OS_UPGRADE_CHANNEL;

    const CHANNEL: &str = NODE_OS_UPGRADE_CHANNEL;

    fn schedule(
        entries: &[(&str, &str)],
    ) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_no_schedule_fails_open() {
        let now = utc("2025-03-01T12:00:00Z");
        assert!(rollout_permitted(None, CHANNEL, now).unwrap());
        // Data present, but nothing for our channel.
        let other = schedule(&[
            ("other-channel-start", "2025-03-01T00:00:00Z"),
            ("other-channel-end", "2025-03-02T00:00:00Z"),
        ]);
        assert!(rollout_permitted(Some(&other), CHANNEL, now).unwrap());
    }

    #[test]
    fn test_incomplete_window() {
        let only_start =
            schedule(&[("node-os-upgrade-start", "2025-03-01T00:00:00Z")]);
        let now = utc("2025-03-01T12:00:00Z");
        assert_matches!(
            rollout_permitted(Some(&only_start), CHANNEL, now),
            Err(WindowGateError::Incomplete { channel }) if channel == CHANNEL
        );
    }

    #[test]
    fn test_malformed_timestamp() {
        let bad = schedule(&[
            ("node-os-upgrade-start", "2025-03-01T00:00:00Z"),
            ("node-os-upgrade-end", "next tuesday"),
        ]);
        let now = utc("2025-03-01T12:00:00Z");
        assert_matches!(
            rollout_permitted(Some(&bad), CHANNEL, now),
            Err(WindowGateError::MalformedTimestamp { key, value, .. })
                if key == "node-os-upgrade-end" && value == "next tuesday"
        );
    }

    #[test]
    fn test_exclusive_bounds() {
        let window = schedule(&[
            ("node-os-upgrade-start", "2025-03-01T00:00:00Z"),
            ("node-os-upgrade-end", "2025-03-01T04:00:00Z"),
        ]);
        let check = |now| {
            rollout_permitted(Some(&window), CHANNEL, utc(now)).unwrap()
        };
        assert!(!check("2025-03-01T00:00:00Z"));
        assert!(check("2025-03-01T00:00:00.000000001Z"));
        assert!(check("2025-03-01T02:00:00Z"));
        assert!(!check("2025-03-01T04:00:00Z"));
        assert!(!check("2025-02-28T23:59:59Z"));
        assert!(!check("2025-03-01T04:00:01Z"));
    }
}
