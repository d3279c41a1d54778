// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interface to the maintenance-window schedule store

use futures::future::BoxFuture;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleFetchError {
    #[error("fetching maintenance schedule for configuration {config:?}")]
    FetchFailed {
        config: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Fetches the raw keyed maintenance-window schedule for a configuration
///
/// Implementations must map their store's "not found" response to
/// `Ok(None)`: an absent schedule means "unscheduled, always permitted" and
/// must not fail the pass.  Every other failure is a [`ScheduleFetchError`]
/// and fails the pass with the previous status preserved.
pub trait ScheduleStore: Send + Sync {
    fn fetch(
        &self,
        config: &str,
    ) -> BoxFuture<
        '_,
        Result<Option<BTreeMap<String, String>>, ScheduleFetchError>,
    >;
}
