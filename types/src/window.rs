// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Maintenance-window schedule keys
//!
//! The schedule store holds, per channel, two string entries keyed
//! `{channel}-start` and `{channel}-end`, each an RFC 3339 timestamp.  Image
//! reconciliation only consumes the node OS upgrade channel.

/// Schedule channel gating non-mandatory node OS image rollouts
pub const NODE_OS_UPGRADE_CHANNEL: &str = "node-os-upgrade";

pub fn window_start_key(channel: &str) -> String {
    format!("{channel}-start")
}

pub fn window_end_key(channel: &str) -> String {
    format!("{channel}-end")
}
