//! Controller core binding an editable, paginated metric grid to a remote
//! entity store: column policy, paged row datasource, cell-edit capture and
//! pending-change-set operations.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use futures::StreamExt;
use shared::protocol::{Metric, ScenarioSummary, SessionSummary, StoreCommand, StoreEvent};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, warn};

pub mod changeset;
pub mod columns;
pub mod config;
pub mod datasource;
pub mod edits;
pub mod reference;
pub mod teardown;

pub use changeset::ChangeSetController;
pub use columns::{build_columns, CellValue, ColumnDescriptor, EditorKind, Field, ValueFormat};
pub use config::{RouteData, ViewConfig};
pub use datasource::RowSource;
pub use edits::EditCapture;
pub use reference::ReferenceCache;
pub use teardown::{Teardown, TeardownSignal};

/// Whether a command made it onto the store's queue. Completion and failure
/// are reported through store events, never through this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Accepted,
    QueueFull,
    Disconnected,
}

impl DispatchOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Seam to the remote entity store: fire-and-forget commands in, multi-value
/// event stream out.
pub trait StoreHandle: Send + Sync {
    fn dispatch(&self, command: StoreCommand) -> DispatchOutcome;
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// Null object used before a real store is wired up; rejects every dispatch
/// and hands out an already-closed event stream.
pub struct DisconnectedStore;

impl StoreHandle for DisconnectedStore {
    fn dispatch(&self, _command: StoreCommand) -> DispatchOutcome {
        DispatchOutcome::Disconnected
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        let (tx, rx) = broadcast::channel(1);
        drop(tx);
        rx
    }
}

fn command_name(command: &StoreCommand) -> &'static str {
    match command {
        StoreCommand::FetchPage(_) => "fetch_page",
        StoreCommand::UpdateEntity { .. } => "update_entity",
        StoreCommand::DeleteEntities { .. } => "delete_entities",
        StoreCommand::CommitPending => "commit_pending",
        StoreCommand::DiscardPending => "discard_pending",
        StoreCommand::CreateEntity { .. } => "create_entity",
        StoreCommand::FetchCostObjects => "fetch_cost_objects",
        StoreCommand::FetchSessions { .. } => "fetch_sessions",
    }
}

pub(crate) fn dispatch_command(store: &dyn StoreHandle, command: StoreCommand) -> DispatchOutcome {
    let name = command_name(&command);
    let outcome = store.dispatch(command);
    match outcome {
        DispatchOutcome::Accepted => debug!(command = name, "queued store command"),
        DispatchOutcome::QueueFull => warn!(command = name, "store command queue is full"),
        DispatchOutcome::Disconnected => {
            warn!(command = name, "store command processor disconnected");
        }
    }
    outcome
}

struct ControllerState {
    scenario: Option<ScenarioSummary>,
    can_modify: Option<bool>,
    has_no_changes: bool,
    last_session: Option<SessionSummary>,
    config: ViewConfig,
    columns: Vec<ColumnDescriptor>,
}

/// Owns the per-view wiring: watches the scenario, permission, reference and
/// pending-change streams, keeps the column set in step with the resolved
/// configuration, and hands out the datasource, edit-capture and change-set
/// collaborators bound to the same teardown signal.
pub struct GridController {
    store: Arc<dyn StoreHandle>,
    route: RouteData,
    cache: ReferenceCache,
    teardown: Teardown,
    state: RwLock<ControllerState>,
}

impl GridController {
    pub fn new(store: Arc<dyn StoreHandle>, route: RouteData) -> Arc<Self> {
        let config = ViewConfig::resolve(&route, None, None);
        let columns = build_columns(&config);
        let controller = Arc::new(Self {
            store,
            route,
            cache: ReferenceCache::new(),
            teardown: Teardown::new(),
            state: RwLock::new(ControllerState {
                scenario: None,
                can_modify: None,
                has_no_changes: true,
                last_session: None,
                config,
                columns,
            }),
        });

        // Watch first so the cost-object response cannot slip past the cache.
        controller.spawn_store_watcher();
        dispatch_command(controller.store.as_ref(), StoreCommand::FetchCostObjects);
        controller
    }

    fn spawn_store_watcher(self: &Arc<Self>) {
        let mut events = BroadcastStream::new(self.store.subscribe());
        let mut teardown = self.teardown.signal();
        let controller = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = teardown.fired() => break,
                    event = events.next() => event,
                };
                match event {
                    Some(Ok(event)) => {
                        let Some(controller) = Weak::upgrade(&controller) else {
                            break;
                        };
                        controller.apply_store_event(event);
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        warn!(skipped, "store watcher lagged behind event stream");
                    }
                    None => break,
                }
            }
        });
    }

    fn apply_store_event(&self, event: StoreEvent) {
        match event {
            StoreEvent::CostObjectsLoaded(items) => self.cache.replace(items),
            StoreEvent::ScenarioActivated(scenario) => {
                let time_period_id = scenario.time_period_id;
                {
                    let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
                    state.scenario = Some(scenario);
                    Self::refresh_view_config(&self.route, &mut state);
                }
                dispatch_command(
                    self.store.as_ref(),
                    StoreCommand::FetchSessions { time_period_id },
                );
            }
            StoreEvent::PermissionResolved(can_modify) => {
                let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
                state.can_modify = Some(can_modify);
                Self::refresh_view_config(&self.route, &mut state);
            }
            StoreEvent::PendingChangesEmpty(empty) => {
                self.state
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .has_no_changes = empty;
            }
            StoreEvent::SessionsLoaded(sessions) => {
                self.state
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .last_session = sessions.into_iter().max_by_key(|s| s.started_at);
            }
            // The row stream is consumed by per-request RowSource subscriptions.
            StoreEvent::RowsLoaded(_) | StoreEvent::TotalCountUpdated(_) => {}
            StoreEvent::Error(error) => {
                warn!(code = ?error.code, message = %error.message, "store reported error");
            }
        }
    }

    fn refresh_view_config(route: &RouteData, state: &mut ControllerState) {
        let config = ViewConfig::resolve(
            route,
            state.scenario.as_ref().map(|s| s.read_only),
            state.can_modify,
        );
        if config != state.config {
            state.config = config;
            state.columns = build_columns(&config);
        }
    }

    pub fn title(&self) -> &str {
        &self.route.title
    }

    pub fn config(&self) -> ViewConfig {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .config
    }

    pub fn columns(&self) -> Vec<ColumnDescriptor> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .columns
            .clone()
    }

    pub fn reference_cache(&self) -> ReferenceCache {
        self.cache.clone()
    }

    pub fn row_source(&self) -> RowSource {
        RowSource::new(
            Arc::clone(&self.store),
            self.route.scope,
            self.cache.clone(),
            self.teardown.signal(),
        )
    }

    pub fn edit_capture(&self) -> EditCapture {
        EditCapture::new(Arc::clone(&self.store))
    }

    pub fn change_set(&self) -> ChangeSetController {
        ChangeSetController::new(Arc::clone(&self.store), self.route.scope)
    }

    /// Row identity for the grid; unsaved rows report zero.
    pub fn row_node_id(metric: &Metric) -> i64 {
        metric.metric_id.0
    }

    pub fn cannot_modify(&self) -> bool {
        self.config().read_only
    }

    pub fn change_buttons_disabled(&self) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.has_no_changes || state.config.read_only
    }

    pub fn last_session(&self) -> Option<SessionSummary> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_session
            .clone()
    }

    /// Stops all callback delivery from every subscription this view created.
    pub fn teardown(&self) {
        self.teardown.fire();
    }
}

impl Drop for GridController {
    fn drop(&mut self) {
        self.teardown.fire();
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
