// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background task reconciling node-pool image versions
//!
//! Each activation lists the node pools, selects the ones whose cooperative
//! requeue time has come (or that a sibling component flagged for a full
//! refresh), and runs one pure decision pass per pool on a bounded worker
//! pool.  All I/O happens here, at the pass boundary; the decision itself is
//! [`nodepool_image_reconciler::decide()`].

use crate::cache::TtlCache;
use crate::catalog::CatalogError;
use crate::catalog::ImageCatalog;
use crate::driver::BackgroundTask;
use crate::schedule::ScheduleFetchError;
use crate::schedule::ScheduleStore;
use crate::store::NodePoolStore;
use crate::store::StoreError;
use chrono::DateTime;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use nodepool_image_reconciler::decide;
use nodepool_image_reconciler::DecideConfig;
use nodepool_image_reconciler::DecideError;
use nodepool_image_reconciler::PassOutcome;
use nodepool_image_reconciler::PassStatus;
use nodepool_image_types::DiscoveredImage;
use nodepool_image_types::NodePoolConfig;
use nodepool_image_types::NODE_OS_UPGRADE_CHANNEL;
use serde::Deserialize;
use serde::Serialize;
use slog::{error, warn, Logger};
use slog_error_chain::InlineErrorChain;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Per-pool reset generations published by the sibling upgrade-detection
/// component
///
/// Bumping a pool's generation asks this task to disregard that pool's
/// pinned versions on its next pass.  The map only ever grows generations;
/// this task tracks which generation it has already honored per pool.
pub type UpgradeResets = BTreeMap<String, u64>;

/// What one activation of the `image_versions` task did, reported through
/// the driver
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ImageVersionTaskStatus {
    /// pools whose pass completed and was persisted
    pub pools: Vec<PassStatus>,
    /// pools skipped because their requeue time has not come
    pub skipped: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Error)]
enum PoolPassError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Schedule(#[from] ScheduleFetchError),
    #[error(transparent)]
    Decide(#[from] DecideError),
}

/// Shared, read-only state handed to each pool's worker
struct PassContext {
    store: Arc<dyn NodePoolStore>,
    catalog: Arc<dyn ImageCatalog>,
    schedule: Arc<dyn ScheduleStore>,
    decide_config: DecideConfig,
    catalog_cache: TtlCache<String, Vec<DiscoveredImage>>,
    schedule_cache: TtlCache<String, Option<BTreeMap<String, String>>>,
}

pub struct ImageVersionReconciler {
    ctx: Arc<PassContext>,
    max_concurrent_pools: usize,
    upgrade_resets: watch::Receiver<UpgradeResets>,
    /// reset generation already honored, per pool
    handled_resets: BTreeMap<String, u64>,
    /// cooperative requeue: no pass for a pool before its due time
    next_due: BTreeMap<String, DateTime<Utc>>,
}

impl ImageVersionReconciler {
    pub fn new(
        store: Arc<dyn NodePoolStore>,
        catalog: Arc<dyn ImageCatalog>,
        schedule: Arc<dyn ScheduleStore>,
        decide_config: DecideConfig,
        max_concurrent_pools: usize,
        cache_ttl: Duration,
        upgrade_resets: watch::Receiver<UpgradeResets>,
    ) -> ImageVersionReconciler {
        ImageVersionReconciler {
            ctx: Arc::new(PassContext {
                store,
                catalog,
                schedule,
                decide_config,
                catalog_cache: TtlCache::new(cache_ttl),
                schedule_cache: TtlCache::new(cache_ttl),
            }),
            max_concurrent_pools,
            upgrade_resets,
            handled_resets: BTreeMap::new(),
            next_due: BTreeMap::new(),
        }
    }

    async fn actually_activate(
        &mut self,
        log: &Logger,
        status: &mut ImageVersionTaskStatus,
    ) {
        let pools = match self.ctx.store.list_pools().await {
            Ok(pools) => pools,
            Err(error) => {
                error!(log, "failed to list node pools";
                    "error" => InlineErrorChain::new(&error),
                );
                status.errors.push(InlineErrorChain::new(&error).to_string());
                return;
            }
        };

        let resets = self.upgrade_resets.borrow_and_update().clone();
        let now = Utc::now();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_pools));
        let mut workers: JoinSet<(
            NodePoolConfig,
            Option<u64>,
            Result<PassOutcome, PoolPassError>,
        )> = JoinSet::new();

        for pool in pools {
            // `None < Some(_)`, so a pool we have never honored a reset for
            // is pending as soon as any generation is published.
            let reset_pending =
                resets.get(&pool.name).is_some_and(|generation| {
                    self.handled_resets.get(&pool.name) < Some(generation)
                });
            let due = match self.next_due.get(&pool.name) {
                Some(time) => *time <= now,
                None => true,
            };
            if !due && !reset_pending {
                status.skipped += 1;
                continue;
            }

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            let ctx = Arc::clone(&self.ctx);
            let log = log.clone();
            let reset_generation = resets.get(&pool.name).copied();
            workers.spawn(async move {
                let _permit = permit;
                let result =
                    reconcile_pool(&log, &ctx, &pool, reset_pending).await;
                (pool, reset_generation, result)
            });
        }

        while let Some(joined) = workers.join_next().await {
            let (pool, reset_generation, result) = match joined {
                Ok(v) => v,
                Err(error) => {
                    error!(log, "pool worker failed";
                        "error" => InlineErrorChain::new(&error),
                    );
                    status
                        .errors
                        .push(InlineErrorChain::new(&error).to_string());
                    continue;
                }
            };

            match result {
                Ok(outcome) => {
                    self.next_due.insert(
                        pool.name.clone(),
                        now + outcome.requeue_after,
                    );
                    if let Some(generation) = reset_generation {
                        self.handled_resets
                            .insert(pool.name.clone(), generation);
                    }
                    status.pools.push(outcome.to_status(&pool.name));
                }
                Err(error) => {
                    // The pass failed with no status mutation.  Clearing the
                    // due time makes the next activation retry this pool.
                    warn!(log, "image version pass failed";
                        "pool" => &pool.name,
                        "error" => InlineErrorChain::new(&error),
                    );
                    self.next_due.remove(&pool.name);
                    status.errors.push(format!(
                        "pool {}: {}",
                        pool.name,
                        InlineErrorChain::new(&error)
                    ));
                }
            }
        }
    }
}

/// Runs one full pass for one pool: gather inputs, decide, persist
async fn reconcile_pool(
    log: &Logger,
    ctx: &PassContext,
    pool: &NodePoolConfig,
    os_upgrade_pending: bool,
) -> Result<PassOutcome, PoolPassError> {
    let current = ctx.store.load_status(&pool.name).await?;

    let discovered = match ctx.catalog_cache.get(&pool.name) {
        Some(discovered) => discovered,
        None => {
            let discovered = ctx.catalog.list(pool).await?;
            ctx.catalog_cache.insert(pool.name.clone(), discovered.clone());
            discovered
        }
    };

    let channel = NODE_OS_UPGRADE_CHANNEL.to_string();
    let maintenance_schedule = match ctx.schedule_cache.get(&channel) {
        Some(schedule) => schedule,
        None => {
            let schedule = ctx.schedule.fetch(&channel).await?;
            ctx.schedule_cache.insert(channel, schedule.clone());
            schedule
        }
    };

    let input = nodepool_image_reconciler::PassInput {
        pool: pool.clone(),
        current,
        os_upgrade_pending,
        discovered,
        maintenance_schedule,
        now: Utc::now(),
    };
    let outcome = decide(log, &ctx.decide_config, &input)?;

    ctx.store.persist_status(&pool.name, &outcome.status).await?;
    Ok(outcome)
}

impl BackgroundTask for ImageVersionReconciler {
    fn activate<'a>(
        &'a mut self,
        log: &'a Logger,
    ) -> BoxFuture<'a, serde_json::Value> {
        async move {
            let mut status = ImageVersionTaskStatus::default();
            self.actually_activate(log, &mut status).await;
            serde_json::json!(status)
        }
        .boxed()
    }
}
