//! Commit, discard, delete-selection and create operations against the
//! store-owned pending change set.

use std::sync::Arc;

use shared::{
    domain::{MetricId, ScopeKind},
    protocol::{PageRequest, ScopeFilter, StoreCommand},
};

use crate::{dispatch_command, DispatchOutcome, StoreHandle};

/// Pure request dispatching; the store owns all diffing state. Completion is
/// observed through store events (pending-empty flag, refreshed rows, error
/// events), never through these return values, which only report whether the
/// command was queued.
pub struct ChangeSetController {
    store: Arc<dyn StoreHandle>,
    scope: ScopeKind,
}

impl ChangeSetController {
    pub fn new(store: Arc<dyn StoreHandle>, scope: ScopeKind) -> Self {
        Self { store, scope }
    }

    pub fn commit(&self) -> DispatchOutcome {
        dispatch_command(self.store.as_ref(), StoreCommand::CommitPending)
    }

    /// Clears the pending change set, then refetches so no pre-discard row
    /// can survive in the view.
    pub fn discard(&self) -> DispatchOutcome {
        let outcome = dispatch_command(self.store.as_ref(), StoreCommand::DiscardPending);
        if outcome.is_accepted() {
            dispatch_command(
                self.store.as_ref(),
                StoreCommand::FetchPage(PageRequest {
                    filter: ScopeFilter::for_scope(self.scope),
                    include_total_count: true,
                }),
            );
        }
        outcome
    }

    /// Selection state belongs to the grid UI; this only reads the ids.
    pub fn delete_selected(&self, selected: Vec<MetricId>) -> DispatchOutcome {
        dispatch_command(
            self.store.as_ref(),
            StoreCommand::DeleteEntities {
                metric_ids: selected,
            },
        )
    }

    pub fn create_new(&self) -> DispatchOutcome {
        dispatch_command(
            self.store.as_ref(),
            StoreCommand::CreateEntity { scope: self.scope },
        )
    }
}
