use std::{sync::Mutex, time::Duration};

use shared::{
    domain::{CostObjectId, EntityKind, MetricId, ScenarioId, ScopeKind, SessionId, TimePeriodId},
    protocol::{
        CostObjectSummary, Metric, ScenarioSummary, ScopeFilter, SessionSummary, StoreCommand,
        StoreEvent,
    },
};
use tokio::sync::mpsc;

use super::*;

struct FakeStore {
    commands: Mutex<Vec<StoreCommand>>,
    events: broadcast::Sender<StoreEvent>,
    outcome: DispatchOutcome,
}

impl FakeStore {
    fn new() -> Arc<Self> {
        Self::with_outcome(DispatchOutcome::Accepted)
    }

    fn with_outcome(outcome: DispatchOutcome) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            commands: Mutex::new(Vec::new()),
            events,
            outcome,
        })
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    fn dispatched(&self) -> Vec<StoreCommand> {
        self.commands.lock().expect("commands lock").clone()
    }
}

impl StoreHandle for FakeStore {
    fn dispatch(&self, command: StoreCommand) -> DispatchOutcome {
        self.commands.lock().expect("commands lock").push(command);
        self.outcome
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

fn sample_metric(id: i64) -> Metric {
    Metric {
        metric_id: MetricId(id),
        name: "Revenue".into(),
        data_type: "Currency".into(),
        size: 12,
        description: "Gross revenue".into(),
        column_name: "REVENUE".into(),
        cost_object_id: None,
    }
}

fn cost_objects() -> Vec<CostObjectSummary> {
    vec![
        CostObjectSummary {
            cost_object_id: CostObjectId(7),
            name: "Marketing".into(),
            is_global: false,
        },
        CostObjectSummary {
            cost_object_id: CostObjectId(8),
            name: "Operations".into(),
            is_global: false,
        },
    ]
}

fn scenario(read_only: bool) -> ScenarioSummary {
    ScenarioSummary {
        scenario_id: ScenarioId(11),
        name: "FY26 Draft".into(),
        read_only,
        time_period_id: TimePeriodId(4),
    }
}

async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..100 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[test]
fn column_policy_counts_and_editability_follow_mode_flags() {
    for scope in [ScopeKind::Partitioned, ScopeKind::Global] {
        for read_only in [false, true] {
            let columns = build_columns(&ViewConfig { scope, read_only });
            let expected = if scope.is_global() { 6 } else { 7 };
            assert_eq!(columns.len(), expected, "scope {scope:?} read_only {read_only}");
            assert_eq!(columns[0].field, Field::Selection);
            assert!(!columns[0].editable, "selection column is never editable");
            for column in &columns[1..] {
                assert_eq!(column.editable, !read_only, "column {:?}", column.field);
            }
        }
    }
}

#[test]
fn global_scope_excludes_business_dimension_column() {
    let columns = build_columns(&ViewConfig {
        scope: ScopeKind::Global,
        read_only: false,
    });
    assert!(columns
        .iter()
        .all(|column| column.field != Field::BusinessDimension));
}

#[test]
fn data_type_formatter_maps_known_key_and_blanks_unknown() {
    let cache = ReferenceCache::new();
    let mut metric = sample_metric(1);

    metric.data_type = "Currency".into();
    assert_eq!(
        ValueFormat::DataTypeName.render(&metric, &cache),
        Some("Currency".to_string())
    );

    metric.data_type = "Geography".into();
    assert_eq!(ValueFormat::DataTypeName.render(&metric, &cache), None);
}

#[test]
fn cost_object_formatter_resolves_name_or_falls_back_to_raw_id() {
    let cache = ReferenceCache::new();
    cache.replace(cost_objects());
    let mut metric = sample_metric(1);

    metric.cost_object_id = Some(CostObjectId(7));
    assert_eq!(
        ValueFormat::CostObjectName.render(&metric, &cache),
        Some("Marketing".to_string())
    );

    metric.cost_object_id = Some(CostObjectId(9));
    assert_eq!(
        ValueFormat::CostObjectName.render(&metric, &cache),
        Some("9".to_string())
    );

    metric.cost_object_id = None;
    assert_eq!(ValueFormat::CostObjectName.render(&metric, &cache), None);
}

#[test]
fn editors_offer_static_data_types_and_live_cost_objects() {
    let cache = ReferenceCache::new();

    let data_types = EditorKind::DataTypeSelect.options(&cache);
    assert_eq!(data_types.len(), columns::DATA_TYPE_OPTIONS.len());
    assert!(data_types
        .iter()
        .any(|option| option.id == "Currency" && option.label == "Currency"));

    assert!(EditorKind::CostObjectSelect.options(&cache).is_empty());
    cache.replace(cost_objects());
    let options = EditorKind::CostObjectSelect.options(&cache);
    assert_eq!(options.len(), 2);
    assert!(options
        .iter()
        .any(|option| option.id == "7" && option.label == "Marketing"));
}

#[test]
fn unchanged_cell_value_dispatches_nothing() {
    let store = FakeStore::new();
    let capture = EditCapture::new(store.clone() as Arc<dyn StoreHandle>);
    let row = sample_metric(3);

    let accepted = capture.on_cell_value_changed(
        Field::Name,
        &CellValue::Text("Revenue".into()),
        &CellValue::Text("Revenue".into()),
        &row,
    );

    assert!(!accepted);
    assert!(store.dispatched().is_empty());
}

#[test]
fn changed_cell_value_dispatches_one_update_with_single_field_replaced() {
    let store = FakeStore::new();
    let capture = EditCapture::new(store.clone() as Arc<dyn StoreHandle>);
    let row = sample_metric(3);

    let accepted = capture.on_cell_value_changed(
        Field::Description,
        &CellValue::Text("Gross revenue".into()),
        &CellValue::Text("Quarterly gross revenue".into()),
        &row,
    );

    assert!(!accepted, "the grid never applies its own optimistic edit");
    let commands = store.dispatched();
    assert_eq!(commands.len(), 1);
    let StoreCommand::UpdateEntity { entity, kind } = &commands[0] else {
        panic!("expected an update command, got {:?}", commands[0]);
    };
    assert_eq!(*kind, EntityKind::Metric);
    let mut expected = row.clone();
    expected.description = "Quarterly gross revenue".into();
    assert_eq!(*entity, expected);
}

#[test]
fn mismatched_value_shape_is_dropped() {
    let store = FakeStore::new();
    let capture = EditCapture::new(store.clone() as Arc<dyn StoreHandle>);
    let row = sample_metric(3);

    let accepted = capture.on_cell_value_changed(
        Field::DataSize,
        &CellValue::Number(12),
        &CellValue::Text("twelve".into()),
        &row,
    );

    assert!(!accepted);
    assert!(store.dispatched().is_empty());
}

#[test]
fn combined_join_waits_for_all_three_inputs() {
    let mut join = datasource::LatestJoin::default();

    assert!(join.absorb(&StoreEvent::RowsLoaded(vec![sample_metric(1)])).is_none());
    assert!(join.absorb(&StoreEvent::TotalCountUpdated(1)).is_none());
    // Non-member emissions never complete the join.
    assert!(join.absorb(&StoreEvent::PermissionResolved(true)).is_none());

    assert!(join
        .absorb(&StoreEvent::CostObjectsLoaded(cost_objects()))
        .is_some());

    // Every later member emission yields again; non-members still do not.
    assert!(join.absorb(&StoreEvent::TotalCountUpdated(2)).is_some());
    assert!(join
        .absorb(&StoreEvent::ScenarioActivated(scenario(false)))
        .is_none());
}

#[tokio::test]
async fn get_rows_waits_for_all_three_sources() {
    let store = FakeStore::new();
    let teardown = Teardown::new();
    let source = RowSource::new(
        store.clone() as Arc<dyn StoreHandle>,
        ScopeKind::Partitioned,
        ReferenceCache::new(),
        teardown.signal(),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = source.get_rows(move |rows, total_count| {
        let _ = tx.send((rows.len(), total_count));
    });
    assert!(outcome.is_accepted());

    let commands = store.dispatched();
    assert!(matches!(
        &commands[0],
        StoreCommand::FetchPage(request)
            if request.filter == ScopeFilter::Partitioned && request.include_total_count
    ));

    store.emit(StoreEvent::RowsLoaded(vec![sample_metric(1)]));
    store.emit(StoreEvent::TotalCountUpdated(1));
    assert!(
        tokio::time::timeout(Duration::from_millis(50), rx.recv())
            .await
            .is_err(),
        "no delivery before the reference data arrives"
    );

    store.emit(StoreEvent::CostObjectsLoaded(cost_objects()));
    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("combined page")
        .expect("subscription alive");
    assert_eq!(first, (1, 1));

    store.emit(StoreEvent::TotalCountUpdated(2));
    let second = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("combined page after count update")
        .expect("subscription alive");
    assert_eq!(second, (1, 2));
}

#[tokio::test]
async fn get_rows_replays_already_mirrored_reference_data() {
    let store = FakeStore::new();
    let teardown = Teardown::new();
    let cache = ReferenceCache::new();
    // Reference data arrived before this page request; the stream will not
    // replay it, the mirror does.
    cache.replace(cost_objects());
    let source = RowSource::new(
        store.clone() as Arc<dyn StoreHandle>,
        ScopeKind::Partitioned,
        cache,
        teardown.signal(),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    source.get_rows(move |rows, total_count| {
        let _ = tx.send((rows.len(), total_count));
    });

    store.emit(StoreEvent::RowsLoaded(vec![sample_metric(1)]));
    store.emit(StoreEvent::TotalCountUpdated(1));
    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("combined page without a fresh reference emission")
        .expect("subscription alive");
    assert_eq!(first, (1, 1));
}

#[tokio::test]
async fn teardown_stops_all_callback_delivery() {
    let store = FakeStore::new();
    let teardown = Teardown::new();
    let source = RowSource::new(
        store.clone() as Arc<dyn StoreHandle>,
        ScopeKind::Global,
        ReferenceCache::new(),
        teardown.signal(),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    source.get_rows(move |rows, total_count| {
        let _ = tx.send((rows.len(), total_count));
    });

    store.emit(StoreEvent::RowsLoaded(vec![sample_metric(1)]));
    store.emit(StoreEvent::TotalCountUpdated(1));
    store.emit(StoreEvent::CostObjectsLoaded(cost_objects()));
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("combined page")
        .expect("subscription alive");

    teardown.fire();
    tokio::time::sleep(Duration::from_millis(20)).await;
    store.emit(StoreEvent::RowsLoaded(Vec::new()));

    match tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
        Err(_) | Ok(None) => {}
        Ok(Some(page)) => panic!("unexpected delivery after teardown: {page:?}"),
    }
}

#[tokio::test]
async fn scenario_lock_recomputes_columns_read_only() {
    let store = FakeStore::new();
    let controller = GridController::new(
        store.clone() as Arc<dyn StoreHandle>,
        RouteData {
            scope: ScopeKind::Partitioned,
            title: "Metrics".into(),
        },
    );
    assert!(!controller.config().read_only);
    assert!(matches!(
        store.dispatched()[0],
        StoreCommand::FetchCostObjects
    ));

    store.emit(StoreEvent::ScenarioActivated(scenario(true)));
    wait_until(|| controller.config().read_only).await;

    let columns = controller.columns();
    assert!(columns[1..].iter().all(|column| !column.editable));

    // Activating a scenario loads the sessions of its time period.
    wait_until(|| {
        store.dispatched().iter().any(|command| {
            matches!(
                command,
                StoreCommand::FetchSessions { time_period_id } if *time_period_id == TimePeriodId(4)
            )
        })
    })
    .await;
}

#[tokio::test]
async fn missing_modify_permission_locks_grid() {
    let store = FakeStore::new();
    let controller = GridController::new(
        store.clone() as Arc<dyn StoreHandle>,
        RouteData {
            scope: ScopeKind::Partitioned,
            title: "Metrics".into(),
        },
    );

    store.emit(StoreEvent::PermissionResolved(false));
    wait_until(|| controller.cannot_modify()).await;
    assert!(controller.config().read_only);
}

#[tokio::test]
async fn global_scope_ignores_reference_cache_for_columns() {
    let store = FakeStore::new();
    let controller = GridController::new(
        store.clone() as Arc<dyn StoreHandle>,
        RouteData {
            scope: ScopeKind::Global,
            title: "Global Metrics".into(),
        },
    );

    store.emit(StoreEvent::CostObjectsLoaded(cost_objects()));
    wait_until(|| !controller.reference_cache().is_empty()).await;

    let columns = controller.columns();
    assert_eq!(columns.len(), 6);
    assert!(columns
        .iter()
        .all(|column| column.field != Field::BusinessDimension));
}

#[tokio::test]
async fn change_buttons_follow_pending_and_lock_state() {
    let store = FakeStore::new();
    let controller = GridController::new(
        store.clone() as Arc<dyn StoreHandle>,
        RouteData {
            scope: ScopeKind::Partitioned,
            title: "Metrics".into(),
        },
    );
    assert!(controller.change_buttons_disabled(), "no changes yet");

    store.emit(StoreEvent::PendingChangesEmpty(false));
    wait_until(|| !controller.change_buttons_disabled()).await;

    store.emit(StoreEvent::ScenarioActivated(scenario(true)));
    wait_until(|| controller.change_buttons_disabled()).await;
}

#[tokio::test]
async fn last_session_tracks_latest_start_time() {
    let store = FakeStore::new();
    let controller = GridController::new(
        store.clone() as Arc<dyn StoreHandle>,
        RouteData {
            scope: ScopeKind::Partitioned,
            title: "Metrics".into(),
        },
    );

    let earlier = SessionSummary {
        session_id: SessionId(1),
        time_period_id: TimePeriodId(4),
        username: "avery".into(),
        started_at: "2026-02-01T09:00:00Z".parse().expect("timestamp"),
    };
    let later = SessionSummary {
        session_id: SessionId(2),
        time_period_id: TimePeriodId(4),
        username: "jordan".into(),
        started_at: "2026-02-03T14:30:00Z".parse().expect("timestamp"),
    };
    store.emit(StoreEvent::SessionsLoaded(vec![later.clone(), earlier]));

    wait_until(|| controller.last_session().is_some()).await;
    assert_eq!(controller.last_session(), Some(later));
}

#[test]
fn discard_requests_clear_then_fresh_page() {
    let store = FakeStore::new();
    let changes = ChangeSetController::new(store.clone() as Arc<dyn StoreHandle>, ScopeKind::Global);

    assert!(changes.discard().is_accepted());

    let commands = store.dispatched();
    assert_eq!(commands.len(), 2);
    assert!(matches!(commands[0], StoreCommand::DiscardPending));
    assert!(matches!(
        &commands[1],
        StoreCommand::FetchPage(request) if request.filter == ScopeFilter::Global
    ));
}

#[test]
fn rejected_discard_skips_refetch() {
    let store = FakeStore::with_outcome(DispatchOutcome::QueueFull);
    let changes =
        ChangeSetController::new(store.clone() as Arc<dyn StoreHandle>, ScopeKind::Partitioned);

    assert_eq!(changes.discard(), DispatchOutcome::QueueFull);
    assert_eq!(store.dispatched().len(), 1);
}

#[test]
fn delete_and_create_dispatch_against_the_active_scope() {
    let store = FakeStore::new();
    let changes =
        ChangeSetController::new(store.clone() as Arc<dyn StoreHandle>, ScopeKind::Partitioned);

    changes.delete_selected(vec![MetricId(3), MetricId(5)]);
    changes.create_new();
    changes.commit();

    let commands = store.dispatched();
    assert!(matches!(
        &commands[0],
        StoreCommand::DeleteEntities { metric_ids } if metric_ids == &[MetricId(3), MetricId(5)]
    ));
    assert!(matches!(
        commands[1],
        StoreCommand::CreateEntity {
            scope: ScopeKind::Partitioned
        }
    ));
    assert!(matches!(commands[2], StoreCommand::CommitPending));
}

#[test]
fn disconnected_store_rejects_dispatch() {
    let store = DisconnectedStore;
    assert_eq!(
        store.dispatch(StoreCommand::CommitPending),
        DispatchOutcome::Disconnected
    );
    let mut events = store.subscribe();
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Closed)
    ));
}

#[test]
fn row_identity_reports_zero_for_unsaved_rows() {
    assert_eq!(GridController::row_node_id(&sample_metric(42)), 42);
    assert_eq!(GridController::row_node_id(&Metric::unsaved()), 0);
    assert!(Metric::unsaved().metric_id.is_unsaved());
}
