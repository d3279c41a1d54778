// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The node-pool configuration resource and its status surface

use crate::condition::ImageListReadiness;
use crate::image::NodeImageRecord;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Security-related knobs on a node pool that constrain image selection
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize,
    JsonSchema,
)]
pub struct SecurityProfile {
    /// only hardened OS images may be used for this pool
    pub hardened_os_required: bool,
    /// the platform capability hardened images need in order to boot
    pub trusted_launch_enabled: bool,
}

/// A structural constraint violation in a pool's configuration
///
/// Not an error: the pass completes with a `NotReady` condition and an empty
/// image list, and nothing changes until the configuration does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreconditionViolation {
    pub message: String,
}

/// The slice of a managed node pool's configuration that image
/// reconciliation depends on
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NodePoolConfig {
    pub name: String,
    #[serde(default)]
    pub security: SecurityProfile,
}

impl NodePoolConfig {
    /// Checks the structural constraints that must hold before any image
    /// computation is attempted
    pub fn precondition_violation(&self) -> Option<PreconditionViolation> {
        if self.security.hardened_os_required
            && !self.security.trusted_launch_enabled
        {
            return Some(PreconditionViolation {
                message: format!(
                    "node pool {:?} requires hardened OS images but does \
                     not enable trusted launch",
                    self.name
                ),
            });
        }
        None
    }
}

/// Durable status published for a node pool: the ordered image list newly
/// provisioned nodes select from, and its readiness condition
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct NodePoolStatus {
    pub node_images: Vec<NodeImageRecord>,
    pub readiness: ImageListReadiness,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_precondition() {
        let mut config = NodePoolConfig {
            name: "pool0".to_string(),
            security: SecurityProfile::default(),
        };
        assert!(config.precondition_violation().is_none());

        config.security.hardened_os_required = true;
        let violation = config.precondition_violation().unwrap();
        assert!(violation.message.contains("pool0"));

        config.security.trusted_launch_enabled = true;
        assert!(config.precondition_violation().is_none());
    }
}
