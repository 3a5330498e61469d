//! In-memory entity store: consumes grid commands from a bounded queue on a
//! spawned worker task and publishes state changes as a broadcast event
//! stream. Committed rows and the pending change set live here; views only
//! ever see their overlay.

use std::collections::{BTreeMap, HashSet};

use grid_core::{columns, DispatchOutcome, StoreHandle};
use shared::{
    domain::{EntityKind, MetricId, ScopeKind},
    error::{ApiException, ErrorCode},
    protocol::{
        CostObjectSummary, Metric, PageRequest, ScenarioSummary, ScopeFilter, SessionSummary,
        StoreCommand, StoreEvent,
    },
};
use tokio::sync::{broadcast, mpsc, mpsc::error::TrySendError};
use tracing::{debug, info, warn};

const COMMAND_QUEUE_DEPTH: usize = 64;
const EVENT_CHANNEL_DEPTH: usize = 256;

/// Initial contents of the store.
#[derive(Debug, Clone)]
pub struct StoreSeed {
    pub metrics: Vec<Metric>,
    pub cost_objects: Vec<CostObjectSummary>,
    pub scenario: ScenarioSummary,
    pub can_modify: bool,
    pub sessions: Vec<SessionSummary>,
    pub page_size: usize,
}

enum WorkerMessage {
    Command(StoreCommand),
    AnnounceContext,
}

pub struct GridStore {
    messages: mpsc::Sender<WorkerMessage>,
    events: broadcast::Sender<StoreEvent>,
}

impl GridStore {
    /// Spawns the command worker and returns the handle views dispatch
    /// against. The worker stops once every handle clone is dropped.
    pub fn launch(seed: StoreSeed) -> Self {
        let (messages, inbox) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_DEPTH);
        let next_metric_id = seed
            .metrics
            .iter()
            .map(|metric| metric.metric_id.0)
            .max()
            .unwrap_or(0)
            + 1;
        let state = StoreState {
            committed: seed
                .metrics
                .into_iter()
                .map(|metric| (metric.metric_id.0, metric))
                .collect(),
            cost_objects: seed.cost_objects,
            sessions: seed.sessions,
            scenario: seed.scenario,
            can_modify: seed.can_modify,
            pending: PendingChangeSet::default(),
            page_size: seed.page_size,
            next_metric_id,
            last_filter: None,
            events: events.clone(),
        };
        tokio::spawn(run_worker(state, inbox));
        Self { messages, events }
    }

    /// Replays the current scenario, permission and pending-change state for
    /// subscribers that attached after launch. Broadcast channels do not
    /// retain past emissions, so late views ask for a replay explicitly.
    pub fn announce_context(&self) -> DispatchOutcome {
        self.enqueue(WorkerMessage::AnnounceContext)
    }

    fn enqueue(&self, message: WorkerMessage) -> DispatchOutcome {
        match self.messages.try_send(message) {
            Ok(()) => DispatchOutcome::Accepted,
            Err(TrySendError::Full(_)) => DispatchOutcome::QueueFull,
            Err(TrySendError::Closed(_)) => DispatchOutcome::Disconnected,
        }
    }
}

impl Clone for GridStore {
    fn clone(&self) -> Self {
        Self {
            messages: self.messages.clone(),
            events: self.events.clone(),
        }
    }
}

impl StoreHandle for GridStore {
    fn dispatch(&self, command: StoreCommand) -> DispatchOutcome {
        self.enqueue(WorkerMessage::Command(command))
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[derive(Default)]
struct PendingChangeSet {
    updates: BTreeMap<i64, Metric>,
    creates: Vec<(ScopeKind, Metric)>,
    deletes: HashSet<i64>,
}

impl PendingChangeSet {
    fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.creates.is_empty() && self.deletes.is_empty()
    }

    fn clear(&mut self) {
        self.updates.clear();
        self.creates.clear();
        self.deletes.clear();
    }
}

/// Owned by the worker task; never touched from anywhere else.
struct StoreState {
    committed: BTreeMap<i64, Metric>,
    cost_objects: Vec<CostObjectSummary>,
    sessions: Vec<SessionSummary>,
    scenario: ScenarioSummary,
    can_modify: bool,
    pending: PendingChangeSet,
    page_size: usize,
    next_metric_id: i64,
    last_filter: Option<ScopeFilter>,
    events: broadcast::Sender<StoreEvent>,
}

async fn run_worker(mut state: StoreState, mut inbox: mpsc::Receiver<WorkerMessage>) {
    while let Some(message) = inbox.recv().await {
        match message {
            WorkerMessage::AnnounceContext => state.announce_context(),
            WorkerMessage::Command(command) => {
                if let Err(rejection) = state.apply(command) {
                    warn!(code = ?rejection.code, message = %rejection.message, "command rejected");
                    state.emit(StoreEvent::Error(rejection.into()));
                }
            }
        }
    }
    debug!("store worker stopped; all handles dropped");
}

impl StoreState {
    fn apply(&mut self, command: StoreCommand) -> Result<(), ApiException> {
        match command {
            StoreCommand::FetchPage(request) => {
                self.last_filter = Some(request.filter);
                self.serve_page(request);
                Ok(())
            }
            StoreCommand::UpdateEntity {
                entity,
                kind: EntityKind::Metric,
            } => self.stage_update(entity),
            StoreCommand::DeleteEntities { metric_ids } => {
                for id in metric_ids {
                    self.pending.deletes.insert(id.0);
                }
                self.after_pending_mutation();
                Ok(())
            }
            StoreCommand::CommitPending => self.commit_pending(),
            StoreCommand::DiscardPending => {
                self.pending.clear();
                self.after_pending_mutation();
                Ok(())
            }
            StoreCommand::CreateEntity { scope } => {
                self.pending.creates.push((scope, Metric::unsaved()));
                self.after_pending_mutation();
                Ok(())
            }
            StoreCommand::FetchCostObjects => {
                self.emit(StoreEvent::CostObjectsLoaded(self.cost_objects.clone()));
                Ok(())
            }
            StoreCommand::FetchSessions { time_period_id } => {
                let sessions = self
                    .sessions
                    .iter()
                    .filter(|session| session.time_period_id == time_period_id)
                    .cloned()
                    .collect();
                self.emit(StoreEvent::SessionsLoaded(sessions));
                Ok(())
            }
        }
    }

    fn stage_update(&mut self, entity: Metric) -> Result<(), ApiException> {
        if !entity.data_type.is_empty() && columns::data_type_label(&entity.data_type).is_none() {
            return Err(ApiException::new(
                ErrorCode::Validation,
                format!("unknown data type '{}'", entity.data_type),
            ));
        }

        if entity.metric_id.is_unsaved() {
            let Some((_, staged)) = self.pending.creates.last_mut() else {
                return Err(ApiException::new(
                    ErrorCode::NotFound,
                    "no pending create to update",
                ));
            };
            *staged = entity;
        } else if self.committed.contains_key(&entity.metric_id.0) {
            self.pending.updates.insert(entity.metric_id.0, entity);
        } else {
            return Err(ApiException::new(
                ErrorCode::NotFound,
                format!("unknown metric id {}", entity.metric_id.0),
            ));
        }

        self.after_pending_mutation();
        Ok(())
    }

    fn commit_pending(&mut self) -> Result<(), ApiException> {
        if self.scenario.read_only {
            return Err(ApiException::new(
                ErrorCode::Forbidden,
                format!("scenario '{}' is read-only", self.scenario.name),
            ));
        }
        if !self.can_modify {
            return Err(ApiException::new(
                ErrorCode::Forbidden,
                "missing modify permission",
            ));
        }

        for (id, updated) in std::mem::take(&mut self.pending.updates) {
            if let Some(slot) = self.committed.get_mut(&id) {
                *slot = updated;
            }
        }
        for id in std::mem::take(&mut self.pending.deletes) {
            self.committed.remove(&id);
        }
        for (_, mut metric) in std::mem::take(&mut self.pending.creates) {
            metric.metric_id = MetricId(self.next_metric_id);
            self.next_metric_id += 1;
            self.committed.insert(metric.metric_id.0, metric);
        }

        info!("committed pending change set");
        self.after_pending_mutation();
        Ok(())
    }

    /// Row streams are projections of store state: every pending-set change
    /// re-serves the last requested page so views re-render from truth.
    fn after_pending_mutation(&mut self) {
        self.emit(StoreEvent::PendingChangesEmpty(self.pending.is_empty()));
        if let Some(filter) = self.last_filter {
            self.serve_page(PageRequest {
                filter,
                include_total_count: true,
            });
        }
    }

    fn serve_page(&self, request: PageRequest) {
        let scope = match request.filter {
            ScopeFilter::Partitioned => ScopeKind::Partitioned,
            ScopeFilter::Global => ScopeKind::Global,
        };
        let mut rows: Vec<Metric> = self
            .committed
            .values()
            .filter(|metric| !self.pending.deletes.contains(&metric.metric_id.0))
            .map(|metric| {
                self.pending
                    .updates
                    .get(&metric.metric_id.0)
                    .cloned()
                    .unwrap_or_else(|| metric.clone())
            })
            .filter(|metric| self.metric_scope(metric) == scope)
            .collect();
        rows.extend(
            self.pending
                .creates
                .iter()
                .filter(|(created_scope, _)| *created_scope == scope)
                .map(|(_, metric)| metric.clone()),
        );

        let total_count = rows.len() as u64;
        rows.truncate(self.page_size);
        debug!(
            filter = request.filter.where_clause(),
            rows = rows.len(),
            total_count,
            "serving page"
        );
        // Re-publish reference data with every page so subscribers that
        // attached after the initial load still combine against the current
        // collection; broadcast channels replay nothing on their own.
        self.emit(StoreEvent::CostObjectsLoaded(self.cost_objects.clone()));
        self.emit(StoreEvent::RowsLoaded(rows));
        if request.include_total_count {
            self.emit(StoreEvent::TotalCountUpdated(total_count));
        }
    }

    /// A metric belongs to the global subset when its business dimension is a
    /// global cost object, or when it has none at all.
    fn metric_scope(&self, metric: &Metric) -> ScopeKind {
        match metric.cost_object_id {
            Some(id) => {
                let is_global = self
                    .cost_objects
                    .iter()
                    .any(|item| item.cost_object_id == id && item.is_global);
                if is_global {
                    ScopeKind::Global
                } else {
                    ScopeKind::Partitioned
                }
            }
            None => ScopeKind::Global,
        }
    }

    fn announce_context(&self) {
        self.emit(StoreEvent::ScenarioActivated(self.scenario.clone()));
        self.emit(StoreEvent::PermissionResolved(self.can_modify));
        self.emit(StoreEvent::PendingChangesEmpty(self.pending.is_empty()));
    }

    fn emit(&self, event: StoreEvent) {
        // Send errors only mean nobody is subscribed right now.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
