// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller configuration

use anyhow::Context;
use camino::Utf8Path;
use nodepool_image_reconciler::DecideConfig;
use serde::Deserialize;
use serde::Serialize;
use serde_with::serde_as;
use serde_with::DurationSeconds;
use std::time::Duration;

/// Configuration of the `image_versions` background task
#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ImageVersionTaskConfig {
    /// period between driver-initiated activations
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "defaults::period")]
    pub period_secs: Duration,

    /// how many node pools may be reconciled concurrently
    #[serde(default = "defaults::max_concurrent_pools")]
    pub max_concurrent_pools: usize,

    /// TTL of the catalog and maintenance-schedule read-through caches
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "defaults::cache_ttl")]
    pub cache_ttl_secs: Duration,

    /// per-pool requeue delay after a pass that published a ready list
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "defaults::ready_requeue")]
    pub ready_requeue_secs: Duration,

    /// per-pool requeue delay after a pass that matched no images
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "defaults::empty_requeue")]
    pub empty_requeue_secs: Duration,
}

mod defaults {
    use std::time::Duration;

    pub(super) fn period() -> Duration {
        Duration::from_secs(60)
    }

    pub(super) fn max_concurrent_pools() -> usize {
        10
    }

    pub(super) fn cache_ttl() -> Duration {
        Duration::from_secs(180)
    }

    pub(super) fn ready_requeue() -> Duration {
        Duration::from_secs(30 * 60)
    }

    pub(super) fn empty_requeue() -> Duration {
        Duration::from_secs(60)
    }
}

impl Default for ImageVersionTaskConfig {
    fn default() -> ImageVersionTaskConfig {
        ImageVersionTaskConfig {
            period_secs: defaults::period(),
            max_concurrent_pools: defaults::max_concurrent_pools(),
            cache_ttl_secs: defaults::cache_ttl(),
            ready_requeue_secs: defaults::ready_requeue(),
            empty_requeue_secs: defaults::empty_requeue(),
        }
    }
}

impl ImageVersionTaskConfig {
    pub fn decide_config(&self) -> DecideConfig {
        DecideConfig {
            ready_requeue: self.ready_requeue_secs,
            empty_requeue: self.empty_requeue_secs,
        }
    }
}

/// Root of the controller's config file
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ControllerConfig {
    #[serde(default)]
    pub image_versions: ImageVersionTaskConfig,
}

impl ControllerConfig {
    pub fn from_file(path: &Utf8Path) -> Result<ControllerConfig, anyhow::Error> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read {:?}", path))?;
        toml::from_str(&contents)
            .with_context(|| format!("parse {:?}", path))
    }
}
