// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interface to the cloud image catalog

use futures::future::BoxFuture;
use nodepool_image_types::DiscoveredImage;
use nodepool_image_types::NodePoolConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("listing candidate images for node pool {pool:?}")]
    ListFailed {
        pool: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Discovers candidate images for a node pool from the cloud catalog
///
/// The returned list is in selection-priority order; the reconciler
/// preserves that order verbatim.  A failure here fails the whole pass for
/// that pool with no status mutation.
pub trait ImageCatalog: Send + Sync {
    fn list(
        &self,
        pool: &NodePoolConfig,
    ) -> BoxFuture<'_, Result<Vec<DiscoveredImage>, CatalogError>>;
}
