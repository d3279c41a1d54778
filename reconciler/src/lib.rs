// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Node-pool image version reconciliation
//!
//! This crate decides which VM image versions newly provisioned nodes in a
//! managed node pool should use.  Each reconciliation pass re-derives the
//! whole decision from current inputs (level-triggered, no event diffing):
//! previously pinned image records, freshly discovered catalog images, the
//! administrator's maintenance window, and the compliance expiration deadline
//! are reconciled into one ordered, deterministic image list.
//!
//! Everything here is pure: all I/O (catalog discovery, maintenance-window
//! retrieval, status persistence) happens at the pass boundary in
//! `nodepool-image-controller`, which feeds a snapshot of inputs to
//! [`decide()`] and persists the outcome.  That split keeps the interesting
//! logic unit-testable without simulating any control-plane machinery.

mod decide;
mod expiry;
mod goal;
mod merge;
mod status;
mod window;

pub use decide::decide;
pub use decide::DecideConfig;
pub use decide::DecideError;
pub use decide::PassInput;
pub use decide::PassOutcome;
pub use expiry::version_expired;
pub use expiry::ExpiryError;
pub use goal::build_goal_state;
pub use merge::merge_with_existing;
pub use merge::MergedRecord;
pub use status::PassStatus;
pub use window::rollout_permitted;
pub use window::WindowGateError;
