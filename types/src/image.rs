// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Image references and per-pool image records

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Reference to one published version of a node VM image
///
/// References are hierarchical paths of the form `<base>/versions/<version>`.
/// Stripping the trailing two segments yields the **base identity**: the
/// stable key that tracks "the same image" across version bumps.  A reference
/// with fewer than two segments is malformed and all base-identity lookups on
/// it fail explicitly rather than underflowing.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(transparent)]
pub struct ImageReference(String);

impl ImageReference {
    pub fn new<S: Into<String>>(reference: S) -> ImageReference {
        ImageReference(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the reference with its trailing `/versions/<version>` removed
    pub fn base_identity(&self) -> Result<String, MalformedImageReference> {
        let segments = self.0.split('/').collect::<Vec<_>>();
        if segments.len() < 2 {
            return Err(MalformedImageReference {
                reference: self.0.clone(),
            });
        }
        Ok(segments[..segments.len() - 2].join("/"))
    }

    /// Returns the trailing version segment, if the reference has one
    pub fn version(&self) -> Option<&str> {
        let mut segments = self.0.rsplit('/');
        let version = segments.next()?;
        // A lone segment has no `/versions/` hierarchy and therefore no
        // version.
        segments.next()?;
        Some(version)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error(
    "malformed image reference {reference:?} \
     (expected \"<base>/versions/<version>\")"
)]
pub struct MalformedImageReference {
    pub reference: String,
}

/// Operator of a node scheduling requirement
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub enum RequirementOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

/// One node scheduling requirement attached to an image record
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct Requirement {
    pub key: String,
    pub operator: RequirementOperator,
    pub values: Vec<String>,
}

/// One entry in a node pool's published image list
///
/// The position of a record within the list is its selection priority.  The
/// list must always be treated as an ordered sequence, never as a set: both
/// comparison and fingerprinting are order-sensitive (which the derived
/// `Hash`/`Eq` over the `Vec` fields provide).
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct NodeImageRecord {
    pub id: ImageReference,
    pub requirements: Vec<Requirement>,
}

/// A scheduling requirement as reported by the image catalog
///
/// Catalog requirements may carry a minimum instance count used elsewhere at
/// selection time.  It is not part of an image's identity, so the goal-state
/// builder discards it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredRequirement {
    pub key: String,
    pub operator: RequirementOperator,
    pub values: Vec<String>,
    pub min_count: Option<u32>,
}

impl DiscoveredRequirement {
    /// Strips the selection-time metadata, leaving the plain triple
    pub fn requirement(&self) -> Requirement {
        Requirement {
            key: self.key.clone(),
            operator: self.operator,
            values: self.values.clone(),
        }
    }
}

/// A candidate image as reported by the image catalog
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredImage {
    pub id: ImageReference,
    pub requirements: Vec<DiscoveredRequirement>,
}
