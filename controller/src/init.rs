// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background task initialization

use crate::catalog::ImageCatalog;
use crate::config::ImageVersionTaskConfig;
use crate::driver::Driver;
use crate::driver::TaskName;
use crate::schedule::ScheduleStore;
use crate::store::NodePoolStore;
use crate::task::ImageVersionReconciler;
use crate::task::UpgradeResets;
use slog::Logger;
use std::sync::Arc;
use tokio::sync::watch;

/// Kick off the image version background task
///
/// `upgrade_resets` is the sibling upgrade-detection component's channel; a
/// change on it both wakes the task (as a driver dependency) and forces a
/// full update for the flagged pools.  Returns the driver plus the task's
/// name for explicit activation and status inspection.
pub fn init(
    log: &Logger,
    config: &ImageVersionTaskConfig,
    store: Arc<dyn NodePoolStore>,
    catalog: Arc<dyn ImageCatalog>,
    schedule: Arc<dyn ScheduleStore>,
    upgrade_resets: watch::Receiver<UpgradeResets>,
) -> (Driver, TaskName) {
    let mut driver = Driver::new();

    let task = ImageVersionReconciler::new(
        store,
        catalog,
        schedule,
        config.decide_config(),
        config.max_concurrent_pools,
        config.cache_ttl_secs,
        upgrade_resets.clone(),
    );

    let task_name = driver.register(
        "image_versions".to_string(),
        "decides which VM image versions newly provisioned nodes use"
            .to_string(),
        config.period_secs,
        Box::new(task),
        log,
        vec![Box::new(upgrade_resets)],
    );

    (driver, task_name)
}
