// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Readiness condition for a node pool's image list

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Machine-readable reason for an image list being not ready
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum UnreadyReason {
    /// the goal-state computation produced no images for this pool
    NoImagesMatched,
    /// the pool's configuration demands a capability it does not enable
    PreconditionViolated,
    /// a sibling component observed an OS version change and requested a
    /// full refresh of the image list
    OsUpgradePending,
}

/// Whether a node pool's published image list is valid and current
///
/// The condition is re-derived on every reconciliation pass.  Anything other
/// than `Ready` forces the next pass to perform a full update, discarding
/// previously pinned versions.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImageListReadiness {
    /// never computed (or externally reset)
    Unknown,
    Ready,
    NotReady { reason: UnreadyReason, message: String },
}

impl ImageListReadiness {
    pub fn not_ready<S: Into<String>>(
        reason: UnreadyReason,
        message: S,
    ) -> ImageListReadiness {
        ImageListReadiness::NotReady { reason, message: message.into() }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ImageListReadiness::Ready)
    }
}

impl Default for ImageListReadiness {
    fn default() -> ImageListReadiness {
        ImageListReadiness::Unknown
    }
}
