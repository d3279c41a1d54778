// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared types for node-pool image version reconciliation
//!
//! This crate defines the data model exchanged between the pure decision
//! logic (`nodepool-image-reconciler`) and the machinery that drives it
//! (`nodepool-image-controller`): image references, per-pool image records,
//! the readiness condition published on the node pool's status, and the
//! maintenance-window schedule keys.

mod condition;
mod image;
mod pool;
mod window;

pub use condition::ImageListReadiness;
pub use condition::UnreadyReason;
pub use image::DiscoveredImage;
pub use image::DiscoveredRequirement;
pub use image::ImageReference;
pub use image::MalformedImageReference;
pub use image::NodeImageRecord;
pub use image::Requirement;
pub use image::RequirementOperator;
pub use pool::NodePoolConfig;
pub use pool::NodePoolStatus;
pub use pool::PreconditionViolation;
pub use pool::SecurityProfile;
pub use window::window_end_key;
pub use window::window_start_key;
pub use window::NODE_OS_UPGRADE_CHANNEL;
