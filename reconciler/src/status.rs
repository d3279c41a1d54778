// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Observability types describing what a reconciliation pass did
//!
//! These are reported (as JSON) through the background-task driver for
//! operator debugging.  They are informational only and carry no decision
//! semantics.

use nodepool_image_types::ImageListReadiness;
use serde::Deserialize;
use serde::Serialize;

/// What one pass over one node pool decided
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct PassStatus {
    pub pool: String,
    /// whether previously pinned versions were disregarded
    pub full_update: bool,
    pub images: usize,
    /// how many records kept a previously pinned version
    pub pinned: usize,
    /// pinned references replaced because their version was past the
    /// compliance deadline
    pub refreshed_expired: Vec<String>,
    /// pinned references replaced because their version could not be
    /// evaluated (favoring freshness over trusting a corrupt pin)
    pub refreshed_unparseable: Vec<String>,
    pub readiness: ImageListReadiness,
    /// whether the published list differs from the previous pass's
    pub changed: bool,
}
