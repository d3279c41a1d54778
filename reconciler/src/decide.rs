// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The per-pass update decision
//!
//! [`decide()`] is the whole state machine for one reconciliation pass over
//! one node pool.  It is a pure function of its input snapshot: the caller
//! gathers all I/O (catalog listing, maintenance-window fetch, the persisted
//! status) before the pass, and persists the outcome after it.

use crate::expiry::version_expired;
use crate::goal::build_goal_state;
use crate::merge::merge_with_existing;
use crate::status::PassStatus;
use crate::window::rollout_permitted;
use crate::window::WindowGateError;
use chrono::DateTime;
use chrono::Utc;
use nodepool_image_types::DiscoveredImage;
use nodepool_image_types::ImageListReadiness;
use nodepool_image_types::MalformedImageReference;
use nodepool_image_types::NodeImageRecord;
use nodepool_image_types::NodePoolConfig;
use nodepool_image_types::NodePoolStatus;
use nodepool_image_types::UnreadyReason;
use nodepool_image_types::NODE_OS_UPGRADE_CHANNEL;
use slog::{debug, info, warn, Logger};
use slog_error_chain::InlineErrorChain;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use thiserror::Error;

/// Tunables for the decision that do not vary per pass
#[derive(Clone, Debug)]
pub struct DecideConfig {
    /// requeue delay after a pass that published a non-empty, ready list
    pub ready_requeue: Duration,
    /// requeue delay after a pass that matched no images
    ///
    /// Kept separate from `ready_requeue` on purpose, even if a deployment
    /// configures them equal.
    pub empty_requeue: Duration,
}

impl Default for DecideConfig {
    fn default() -> DecideConfig {
        DecideConfig {
            ready_requeue: Duration::from_secs(30 * 60),
            empty_requeue: Duration::from_secs(60),
        }
    }
}

/// Snapshot of everything one pass depends on
///
/// All fields are plain data.  In particular the sibling upgrade-detection
/// component's "please do a full update" signal arrives here as
/// `os_upgrade_pending`, never as hidden shared state.
#[derive(Clone, Debug)]
pub struct PassInput {
    pub pool: NodePoolConfig,
    /// the status persisted by the previous successful pass
    pub current: NodePoolStatus,
    /// set when a sibling component observed an underlying OS version change
    /// and wants pinned versions abandoned on this pass
    pub os_upgrade_pending: bool,
    /// candidate images from the catalog, in selection-priority order
    pub discovered: Vec<DiscoveredImage>,
    /// raw maintenance-window schedule data, `None` if the store has none
    /// (a store-level "not found" is mapped to `None` by the caller)
    pub maintenance_schedule: Option<BTreeMap<String, String>>,
    pub now: DateTime<Utc>,
}

/// What the pass decided
///
/// `status` replaces the pool's persisted status wholesale; the decision
/// logic never mutates a previous list in place.
#[derive(Clone, Debug)]
pub struct PassOutcome {
    pub status: NodePoolStatus,
    pub requeue_after: Duration,
    pub pass: PassStatusParts,
}

/// Bookkeeping accumulated while deciding, used to build a [`PassStatus`]
#[derive(Clone, Debug, Default)]
pub struct PassStatusParts {
    pub full_update: bool,
    pub pinned: usize,
    pub refreshed_expired: Vec<String>,
    pub refreshed_unparseable: Vec<String>,
    pub changed: bool,
}

#[derive(Debug, Error)]
pub enum DecideError {
    #[error("evaluating maintenance window")]
    Window(#[from] WindowGateError),

    #[error(transparent)]
    MalformedReference(#[from] MalformedImageReference),
}

/// Decides, for one node pool, which image versions newly provisioned nodes
/// should use
///
/// Evaluated strictly in order: precondition check, goal-state computation,
/// full-vs-partial update decision, merge with the per-record expiration
/// sweep, empty-goal handling.  On error the caller must leave the persisted
/// status untouched and retry with backoff.
pub fn decide(
    log: &Logger,
    config: &DecideConfig,
    input: &PassInput,
) -> Result<PassOutcome, DecideError> {
    let mut parts = PassStatusParts::default();

    // A structurally invalid configuration short-circuits everything: clear
    // the list, report why, and wait for the configuration to change.
    if let Some(violation) = input.pool.precondition_violation() {
        info!(log, "image list blocked by configuration precondition";
            "pool" => &input.pool.name,
            "violation" => &violation.message,
        );
        let status = NodePoolStatus {
            node_images: Vec::new(),
            readiness: ImageListReadiness::not_ready(
                UnreadyReason::PreconditionViolated,
                violation.message,
            ),
        };
        parts.changed = fingerprint(&status.node_images)
            != fingerprint(&input.current.node_images);
        return Ok(PassOutcome {
            status,
            requeue_after: config.ready_requeue,
            pass: parts,
        });
    }

    let discovered = build_goal_state(&input.discovered);

    // The sibling upgrade-detection component's reset acts exactly like a
    // not-ready condition on this pass.
    let currently_ready =
        input.current.readiness.is_ready() && !input.os_upgrade_pending;

    // A list that is not currently ready (first-ever pass, or an external
    // reset) is rebuilt wholesale without consulting the window: adopting a
    // valid list is mandatory, not a version bump.  Only when an existing
    // ready list could be preserved does the window gate matter, so only
    // then can its configuration errors fail the pass.
    let full_update = !currently_ready
        || rollout_permitted(
            input.maintenance_schedule.as_ref(),
            NODE_OS_UPGRADE_CHANNEL,
            input.now,
        )?;

    let goal = if full_update {
        parts.full_update = true;
        discovered
    } else {
        let merged =
            merge_with_existing(&input.current.node_images, &discovered)?;

        // The merged list is positionally parallel to `discovered`.  Pinned
        // records get the expiration sweep; compliance expiration overrides
        // the closed window, replacing just that record with its discovered
        // counterpart.
        let mut goal = Vec::with_capacity(merged.len());
        for (merged_record, discovered_record) in
            merged.into_iter().zip(discovered)
        {
            if !merged_record.pinned {
                goal.push(discovered_record);
                continue;
            }

            let record = merged_record.record;
            let pinned_version = record.id.version().unwrap_or("");
            match version_expired(pinned_version, input.now) {
                Ok(false) => {
                    parts.pinned += 1;
                    goal.push(record);
                }
                Ok(true) => {
                    info!(log, "pinned image version expired; refreshing";
                        "pool" => &input.pool.name,
                        "pinned" => %record.id,
                        "refreshed" => %discovered_record.id,
                    );
                    parts.refreshed_expired.push(record.id.to_string());
                    goal.push(discovered_record);
                }
                Err(error) => {
                    // A corrupt pin is not worth failing the pass over;
                    // favor freshness over trusting it.
                    warn!(
                        log,
                        "could not evaluate pinned image version; refreshing";
                        "pool" => &input.pool.name,
                        "pinned" => %record.id,
                        "error" => InlineErrorChain::new(&error),
                    );
                    parts.refreshed_unparseable.push(record.id.to_string());
                    goal.push(discovered_record);
                }
            }
        }
        goal
    };

    let (status, requeue_after) = if goal.is_empty() {
        (
            NodePoolStatus {
                node_images: Vec::new(),
                readiness: ImageListReadiness::not_ready(
                    UnreadyReason::NoImagesMatched,
                    "no images matched this node pool",
                ),
            },
            config.empty_requeue,
        )
    } else {
        (
            NodePoolStatus {
                node_images: goal,
                readiness: ImageListReadiness::Ready,
            },
            config.ready_requeue,
        )
    };

    // Informational only: compare the previous and new lists as ordered
    // sequences.  This never alters the decision.
    parts.changed = fingerprint(&status.node_images)
        != fingerprint(&input.current.node_images);
    if parts.changed {
        info!(log, "node image list changed";
            "pool" => &input.pool.name,
            "previous_count" => input.current.node_images.len(),
            "new_count" => status.node_images.len(),
            "full_update" => parts.full_update,
        );
    } else {
        debug!(log, "node image list unchanged";
            "pool" => &input.pool.name,
            "count" => status.node_images.len(),
        );
    }

    Ok(PassOutcome { status, requeue_after, pass: parts })
}

impl PassOutcome {
    pub fn to_status(&self, pool: &str) -> PassStatus {
        PassStatus {
            pool: pool.to_string(),
            full_update: self.pass.full_update,
            images: self.status.node_images.len(),
            pinned: self.pass.pinned,
            refreshed_expired: self.pass.refreshed_expired.clone(),
            refreshed_unparseable: self.pass.refreshed_unparseable.clone(),
            readiness: self.status.readiness.clone(),
            changed: self.pass.changed,
        }
    }
}

/// Order-sensitive structural hash of an image list
fn fingerprint(records: &[NodeImageRecord]) -> u64 {
    let mut hasher = DefaultHasher::new();
    records.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use nodepool_image_types::DiscoveredRequirement;
    use nodepool_image_types::ImageReference;
    use nodepool_image_types::RequirementOperator;
    use nodepool_image_types::SecurityProfile;

    fn logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn pool() -> NodePoolConfig {
        NodePoolConfig {
            name: "pool0".to_string(),
            security: SecurityProfile::default(),
        }
    }

    fn discovered(reference: &str) -> DiscoveredImage {
        DiscoveredImage {
            id: ImageReference::new(reference),
            requirements: vec![DiscoveredRequirement {
                key: "kubernetes.io/arch".to_string(),
                operator: RequirementOperator::In,
                values: vec!["amd64".to_string()],
                min_count: Some(1),
            }],
        }
    }

    fn record(reference: &str) -> NodeImageRecord {
        NodeImageRecord {
            id: ImageReference::new(reference),
            requirements: vec![nodepool_image_types::Requirement {
                key: "kubernetes.io/arch".to_string(),
                operator: RequirementOperator::In,
                values: vec!["amd64".to_string()],
            }],
        }
    }

    fn closed_window() -> BTreeMap<String, String> {
        [
            ("node-os-upgrade-start", "2025-06-02T00:00:00Z"),
            ("node-os-upgrade-end", "2025-06-02T04:00:00Z"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn now() -> DateTime<Utc> {
        // Outside `closed_window()`.
        "2025-06-01T12:00:00Z".parse().unwrap()
    }

    fn input(
        current: NodePoolStatus,
        discovered: Vec<DiscoveredImage>,
    ) -> PassInput {
        PassInput {
            pool: pool(),
            current,
            os_upgrade_pending: false,
            discovered,
            maintenance_schedule: None,
            now: now(),
        }
    }

    fn ready(images: Vec<NodeImageRecord>) -> NodePoolStatus {
        NodePoolStatus {
            node_images: images,
            readiness: ImageListReadiness::Ready,
        }
    }

    #[test]
    fn test_cold_start_full_update() {
        let config = DecideConfig::default();
        let input = input(
            NodePoolStatus::default(),
            vec![
                discovered("a/versions/202505.20.0"),
                discovered("b/versions/202505.20.0"),
                discovered("c/versions/202505.20.0"),
            ],
        );

        let outcome = decide(&logger(), &config, &input).unwrap();
        assert!(outcome.pass.full_update);
        assert!(outcome.pass.changed);
        assert_eq!(outcome.status.readiness, ImageListReadiness::Ready);
        assert_eq!(outcome.requeue_after, config.ready_requeue);
        let ids = outcome
            .status
            .node_images
            .iter()
            .map(|r| r.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec![
                "a/versions/202505.20.0",
                "b/versions/202505.20.0",
                "c/versions/202505.20.0"
            ]
        );
    }

    #[test]
    fn test_empty_catalog() {
        let config = DecideConfig::default();
        let input = input(ready(vec![record("a/versions/v1")]), vec![]);

        let outcome = decide(&logger(), &config, &input).unwrap();
        assert!(outcome.status.node_images.is_empty());
        assert_matches!(
            outcome.status.readiness,
            ImageListReadiness::NotReady {
                reason: UnreadyReason::NoImagesMatched,
                ..
            }
        );
        assert_eq!(outcome.requeue_after, config.empty_requeue);
        assert!(outcome.pass.changed);
    }

    #[test]
    fn test_partial_merge_pins_and_adds() {
        let config = DecideConfig::default();
        let mut input = input(
            ready(vec![
                record("a/versions/202505.28.0"),
                record("b/versions/202505.28.0"),
            ]),
            vec![
                discovered("a/versions/202506.01.0"),
                discovered("b/versions/202506.01.0"),
                discovered("c/versions/202506.01.0"),
            ],
        );
        input.maintenance_schedule = Some(closed_window());

        let outcome = decide(&logger(), &config, &input).unwrap();
        assert!(!outcome.pass.full_update);
        assert_eq!(outcome.pass.pinned, 2);
        let ids = outcome
            .status
            .node_images
            .iter()
            .map(|r| r.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec![
                "a/versions/202505.28.0",
                "b/versions/202505.28.0",
                "c/versions/202506.01.0"
            ]
        );
        assert_eq!(outcome.status.readiness, ImageListReadiness::Ready);
    }

    #[test]
    fn test_open_window_adopts_discovered_versions() {
        let config = DecideConfig::default();
        let mut input = input(
            ready(vec![record("a/versions/202505.28.0")]),
            vec![discovered("a/versions/202506.01.0")],
        );
        // `now()` falls inside this window.
        input.maintenance_schedule = Some(
            [
                ("node-os-upgrade-start", "2025-06-01T00:00:00Z"),
                ("node-os-upgrade-end", "2025-06-02T00:00:00Z"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        );

        let outcome = decide(&logger(), &config, &input).unwrap();
        assert!(outcome.pass.full_update);
        assert_eq!(
            outcome.status.node_images[0].id.as_str(),
            "a/versions/202506.01.0"
        );
    }

    #[test]
    fn test_expiration_overrides_closed_window() {
        let config = DecideConfig::default();
        // 91 days before `now()`.
        let mut input = input(
            ready(vec![record("a/versions/202503.02.0")]),
            vec![discovered("a/versions/202506.01.0")],
        );
        input.maintenance_schedule = Some(closed_window());

        let outcome = decide(&logger(), &config, &input).unwrap();
        assert!(!outcome.pass.full_update);
        assert_eq!(outcome.pass.pinned, 0);
        assert_eq!(
            outcome.pass.refreshed_expired,
            vec!["a/versions/202503.02.0".to_string()]
        );
        assert_eq!(
            outcome.status.node_images[0].id.as_str(),
            "a/versions/202506.01.0"
        );
    }

    #[test]
    fn test_unparseable_pin_refreshed_without_failing() {
        let config = DecideConfig::default();
        // Matches the dated pattern but is not a real date.
        let mut input = input(
            ready(vec![record("a/versions/202513.88.0")]),
            vec![discovered("a/versions/202506.01.0")],
        );
        input.maintenance_schedule = Some(closed_window());

        let outcome = decide(&logger(), &config, &input).unwrap();
        assert_eq!(
            outcome.pass.refreshed_unparseable,
            vec!["a/versions/202513.88.0".to_string()]
        );
        assert_eq!(
            outcome.status.node_images[0].id.as_str(),
            "a/versions/202506.01.0"
        );
    }

    #[test]
    fn test_os_upgrade_reset_forces_full_update() {
        let config = DecideConfig::default();
        let mut input = input(
            ready(vec![record("a/versions/202505.28.0")]),
            vec![discovered("a/versions/202506.01.0")],
        );
        input.maintenance_schedule = Some(closed_window());
        input.os_upgrade_pending = true;

        let outcome = decide(&logger(), &config, &input).unwrap();
        assert!(outcome.pass.full_update);
        assert_eq!(
            outcome.status.node_images[0].id.as_str(),
            "a/versions/202506.01.0"
        );
    }

    #[test]
    fn test_precondition_violation_clears_list() {
        let config = DecideConfig::default();
        let mut input = input(
            ready(vec![record("a/versions/202505.28.0")]),
            vec![discovered("a/versions/202506.01.0")],
        );
        input.pool.security = SecurityProfile {
            hardened_os_required: true,
            trusted_launch_enabled: false,
        };

        let outcome = decide(&logger(), &config, &input).unwrap();
        assert!(outcome.status.node_images.is_empty());
        assert_matches!(
            outcome.status.readiness,
            ImageListReadiness::NotReady {
                reason: UnreadyReason::PreconditionViolated,
                ..
            }
        );
        // Requeued at normal cadence: nothing changes until the
        // configuration does.
        assert_eq!(outcome.requeue_after, config.ready_requeue);
    }

    #[test]
    fn test_window_error_fails_pass_only_when_consulted() {
        let config = DecideConfig::default();
        let broken = [
            ("node-os-upgrade-start", "2025-06-01T00:00:00Z"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>();

        // Ready list: the gate is consulted and its error fails the pass.
        let mut input = input(
            ready(vec![record("a/versions/202505.28.0")]),
            vec![discovered("a/versions/202506.01.0")],
        );
        input.maintenance_schedule = Some(broken.clone());
        assert_matches!(
            decide(&logger(), &config, &input),
            Err(DecideError::Window(WindowGateError::Incomplete { .. }))
        );

        // Unready list: full update is mandatory, the gate never runs.
        let mut cold = PassInput {
            current: NodePoolStatus::default(),
            ..input.clone()
        };
        cold.maintenance_schedule = Some(broken);
        assert!(decide(&logger(), &config, &cold).is_ok());
    }

    #[test]
    fn test_idempotent() {
        let config = DecideConfig::default();
        let mut first_input = input(
            ready(vec![
                record("a/versions/202505.28.0"),
                record("b/versions/202505.28.0"),
            ]),
            vec![
                discovered("a/versions/202506.01.0"),
                discovered("b/versions/202506.01.0"),
                discovered("c/versions/202506.01.0"),
            ],
        );
        first_input.maintenance_schedule = Some(closed_window());

        let first = decide(&logger(), &config, &first_input).unwrap();

        let mut second_input = first_input.clone();
        second_input.current = first.status.clone();
        let second = decide(&logger(), &config, &second_input).unwrap();

        assert_eq!(second.status, first.status);
        assert!(!second.pass.changed);
    }
}
