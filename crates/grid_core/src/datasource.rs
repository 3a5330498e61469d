//! Paged row datasource: one fetch command plus a combined subscription over
//! rows, total count and reference data.

use std::sync::Arc;

use futures::StreamExt;
use shared::{
    domain::ScopeKind,
    protocol::{CostObjectSummary, Metric, PageRequest, ScopeFilter, StoreCommand, StoreEvent},
};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::debug;

use crate::{
    dispatch_command, reference::ReferenceCache, teardown::TeardownSignal, DispatchOutcome,
    StoreHandle,
};

/// Fan-in over the three page inputs. Keeps the last value of each and yields
/// a combined page only once all three have emitted at least once.
#[derive(Default)]
pub(crate) struct LatestJoin {
    rows: Option<Vec<Metric>>,
    total_count: Option<u64>,
    references: Option<Vec<CostObjectSummary>>,
}

impl LatestJoin {
    pub(crate) fn absorb(&mut self, event: &StoreEvent) -> Option<(Vec<Metric>, u64)> {
        match event {
            StoreEvent::RowsLoaded(rows) => self.rows = Some(rows.clone()),
            StoreEvent::TotalCountUpdated(count) => self.total_count = Some(*count),
            StoreEvent::CostObjectsLoaded(items) => self.references = Some(items.clone()),
            _ => return None,
        }
        match (&self.rows, self.total_count, &self.references) {
            (Some(rows), Some(total_count), Some(_)) => Some((rows.clone(), total_count)),
            _ => None,
        }
    }
}

/// Answers grid page requests. Each `get_rows` call issues a fresh fetch;
/// the store owns any dedup or debouncing of identical in-flight requests.
pub struct RowSource {
    store: Arc<dyn StoreHandle>,
    scope: ScopeKind,
    cache: ReferenceCache,
    teardown: TeardownSignal,
}

impl RowSource {
    pub fn new(
        store: Arc<dyn StoreHandle>,
        scope: ScopeKind,
        cache: ReferenceCache,
        teardown: TeardownSignal,
    ) -> Self {
        Self {
            store,
            scope,
            cache,
            teardown,
        }
    }

    /// Dispatches the page fetch and registers the combined subscription.
    /// The callback first fires once rows, total count and reference data
    /// have all arrived, then again on every later emission of any of them,
    /// until the teardown signal fires.
    pub fn get_rows<F>(&self, on_rows_ready: F) -> DispatchOutcome
    where
        F: Fn(Vec<Metric>, u64) + Send + 'static,
    {
        let request = PageRequest {
            filter: ScopeFilter::for_scope(self.scope),
            include_total_count: true,
        };
        // Subscribe before dispatching so the page produced by this fetch
        // cannot be missed.
        let events = BroadcastStream::new(self.store.subscribe());
        // Broadcast streams do not replay; reference data that arrived before
        // this call is taken from the mirrored cache instead.
        let join = LatestJoin {
            rows: None,
            total_count: None,
            references: self.cache.latest(),
        };
        let outcome = dispatch_command(self.store.as_ref(), StoreCommand::FetchPage(request));
        tokio::spawn(run_combined_subscription(
            events,
            join,
            self.teardown.clone(),
            on_rows_ready,
        ));
        outcome
    }
}

async fn run_combined_subscription<F>(
    mut events: BroadcastStream<StoreEvent>,
    mut join: LatestJoin,
    mut teardown: TeardownSignal,
    on_rows_ready: F,
) where
    F: Fn(Vec<Metric>, u64) + Send + 'static,
{
    loop {
        let event = tokio::select! {
            _ = teardown.fired() => break,
            event = events.next() => event,
        };
        match event {
            Some(Ok(event)) => {
                if let Some((rows, total_count)) = join.absorb(&event) {
                    if teardown.is_fired() {
                        break;
                    }
                    debug!(rows = rows.len(), total_count, "delivering combined page");
                    on_rows_ready(rows, total_count);
                }
            }
            // A lagged receiver resumes at the newest values; last write wins.
            Some(Err(BroadcastStreamRecvError::Lagged(_))) => continue,
            None => break,
        }
    }
}
