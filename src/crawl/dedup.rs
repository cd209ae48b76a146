// src/crawl/dedup.rs
//! Once-per-run claims on discovered entities.

use crate::types::{EntityKind, ResourceId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

pub type ClaimKey = (EntityKind, ResourceId);

/// The run's claim set.
///
/// A claim covers both persisting a record and expanding its children, so a
/// chapter or video shared by two parents is written and fetched once. The
/// shard lock is held only inside `try_claim`, never across an await.
#[derive(Debug, Default)]
pub struct ClaimTracker {
    claimed: DashMap<ClaimKey, ()>,
}

impl ClaimTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` exactly once per key.
    pub fn try_claim(&self, kind: EntityKind, id: &ResourceId) -> bool {
        match self.claimed.entry((kind, id.clone())) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(());
                true
            }
        }
    }
}
