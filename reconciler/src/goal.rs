// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Canonicalizing discovered catalog images into goal-state records

use nodepool_image_types::DiscoveredImage;
use nodepool_image_types::NodeImageRecord;

/// Converts freshly discovered catalog images into the canonical record list
///
/// Each record's requirement list is sorted by `(key length, key)` so that
/// repeated passes over the same catalog data produce byte-for-byte identical
/// output regardless of the catalog's requirement ordering.  The ordering
/// *across* records is the catalog's and is preserved verbatim: it becomes
/// downstream selection priority, so it is never sorted or deduplicated.
pub fn build_goal_state(discovered: &[DiscoveredImage]) -> Vec<NodeImageRecord> {
    discovered
        .iter()
        .map(|image| {
            let mut requirements = image
                .requirements
                .iter()
                .map(|r| r.requirement())
                .collect::<Vec<_>>();
            requirements
                .sort_by(|a, b| (a.key.len(), &a.key).cmp(&(b.key.len(), &b.key)));
            NodeImageRecord { id: image.id.clone(), requirements }
        })
        .collect()
}
