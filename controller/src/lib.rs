// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Machinery that drives node-pool image reconciliation
//!
//! The decision logic itself lives in `nodepool-image-reconciler` and is
//! pure.  This crate supplies everything around it: the background-task
//! [`driver`] that schedules periodic and on-demand activations, the trait
//! seams to the external collaborators (image catalog, maintenance-window
//! schedule store, node-pool store), short-TTL read-through caches, and the
//! configuration surface.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod driver;
pub mod init;
pub mod schedule;
pub mod store;
pub mod task;
