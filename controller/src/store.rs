// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interface to the durable store of node pools and their image status

use futures::future::BoxFuture;
use nodepool_image_types::NodePoolConfig;
use nodepool_image_types::NodePoolStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("listing node pools")]
    ListFailed(#[source] anyhow::Error),

    #[error("loading status for node pool {pool:?}")]
    LoadFailed {
        pool: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("persisting status for node pool {pool:?}")]
    PersistFailed {
        pool: String,
        #[source]
        source: anyhow::Error,
    },
}

/// The durable store owning node-pool configurations and their persisted
/// image status
///
/// The reconciler only ever replaces a pool's status wholesale; it never
/// mutates the persisted list in place.
pub trait NodePoolStore: Send + Sync {
    fn list_pools(
        &self,
    ) -> BoxFuture<'_, Result<Vec<NodePoolConfig>, StoreError>>;

    fn load_status(
        &self,
        pool: &str,
    ) -> BoxFuture<'_, Result<NodePoolStatus, StoreError>>;

    fn persist_status(
        &self,
        pool: &str,
        status: &NodePoolStatus,
    ) -> BoxFuture<'_, Result<(), StoreError>>;
}
