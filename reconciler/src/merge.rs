// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Merging previously pinned records with newly discovered ones

use nodepool_image_types::MalformedImageReference;
use nodepool_image_types::NodeImageRecord;
use std::collections::BTreeMap;

/// A record produced by [`merge_with_existing`], tagged with where it came
/// from so the orchestrator can run the expiration sweep over pinned records
/// only
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedRecord {
    pub record: NodeImageRecord,
    /// true if the record was carried over from the previously persisted
    /// list rather than taken from discovery
    pub pinned: bool,
}

/// Merges the previously persisted records with newly discovered ones,
/// per base identity
///
/// The discovered list is iterated in its given order (preserving selection
/// priority).  A base identity present in both sets keeps its previous
/// record, pinning the version.  A newly discovered base identity is
/// soft-added on its latest version.  A base identity that is no longer
/// discovered is dropped, pinned or not.
pub fn merge_with_existing(
    existing: &[NodeImageRecord],
    discovered: &[NodeImageRecord],
) -> Result<Vec<MergedRecord>, MalformedImageReference> {
    let mut by_base = BTreeMap::new();
    for record in existing {
        by_base.insert(record.id.base_identity()?, record);
    }

    let mut merged = Vec::with_capacity(discovered.len());
    for record in discovered {
        let merged_record = match by_base.get(&record.id.base_identity()?) {
            Some(previous) => {
                MergedRecord { record: (*previous).clone(), pinned: true }
            }
            None => MergedRecord { record: record.clone(), pinned: false },
        };
        merged.push(merged_record);
    }
    Ok(merged)
}
