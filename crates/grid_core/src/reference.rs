//! Read-only mirror of the latest cost-object collection.

use std::sync::{Arc, PoisonError, RwLock};

use shared::{domain::CostObjectId, protocol::CostObjectSummary};

/// Holds the last cost-object set the store emitted so formatters can resolve
/// display names synchronously while rendering, and so late subscribers can
/// replay the value a broadcast stream no longer carries. Refreshes are
/// whole-set replacements; last write wins.
#[derive(Clone, Default)]
pub struct ReferenceCache {
    inner: Arc<RwLock<Option<Vec<CostObjectSummary>>>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, items: Vec<CostObjectSummary>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(items);
    }

    /// The last emitted collection, or `None` when the store has not
    /// delivered reference data yet (an empty set is a real emission).
    pub fn latest(&self) -> Option<Vec<CostObjectSummary>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn display_name(&self, id: CostObjectId) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|item| item.cost_object_id == id)
            .map(|item| item.name.clone())
    }

    pub fn snapshot(&self) -> Vec<CostObjectSummary> {
        self.latest().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .map_or(0, <[CostObjectSummary]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
