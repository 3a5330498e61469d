use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{CostObjectId, EntityKind, MetricId, ScenarioId, ScopeKind, SessionId, TimePeriodId},
    error::ApiError,
};

const WHERE_GLOBAL_METRICS: &str = "(CostObject.IsGlobal == true)";
const WHERE_PARTITIONED_METRICS: &str = "(CostObject.IsGlobal == false)";

/// One catalog row. Identity is immutable once the store assigns it;
/// `MetricId::UNSAVED` marks rows that only exist in the pending change set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub metric_id: MetricId,
    pub name: String,
    pub data_type: String,
    pub size: i64,
    pub description: String,
    pub column_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_object_id: Option<CostObjectId>,
}

impl Metric {
    pub fn unsaved() -> Self {
        Self {
            metric_id: MetricId::UNSAVED,
            name: String::new(),
            data_type: String::new(),
            size: 0,
            description: String::new(),
            column_name: String::new(),
            cost_object_id: None,
        }
    }
}

/// Foreign-key target used only for display-name resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostObjectSummary {
    pub cost_object_id: CostObjectId,
    pub name: String,
    pub is_global: bool,
}

/// Active-scope descriptor: lock state plus the time period the editing
/// session belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub scenario_id: ScenarioId,
    pub name: String,
    pub read_only: bool,
    pub time_period_id: TimePeriodId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub time_period_id: TimePeriodId,
    pub username: String,
    pub started_at: DateTime<Utc>,
}

/// Which partition of rows a page request addresses. Renders to one of the
/// two fixed predicate tokens of the remote query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeFilter {
    Partitioned,
    Global,
}

impl ScopeFilter {
    pub fn for_scope(scope: ScopeKind) -> Self {
        match scope {
            ScopeKind::Partitioned => Self::Partitioned,
            ScopeKind::Global => Self::Global,
        }
    }

    pub fn where_clause(self) -> &'static str {
        match self {
            Self::Partitioned => WHERE_PARTITIONED_METRICS,
            Self::Global => WHERE_GLOBAL_METRICS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub filter: ScopeFilter,
    pub include_total_count: bool,
}

/// `rows.len() <= total_count` holds for every result the store serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub rows: Vec<Metric>,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StoreCommand {
    FetchPage(PageRequest),
    UpdateEntity {
        entity: Metric,
        kind: EntityKind,
    },
    DeleteEntities {
        metric_ids: Vec<MetricId>,
    },
    CommitPending,
    DiscardPending,
    CreateEntity {
        scope: ScopeKind,
    },
    FetchCostObjects,
    FetchSessions {
        time_period_id: TimePeriodId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StoreEvent {
    RowsLoaded(Vec<Metric>),
    TotalCountUpdated(u64),
    CostObjectsLoaded(Vec<CostObjectSummary>),
    ScenarioActivated(ScenarioSummary),
    PermissionResolved(bool),
    PendingChangesEmpty(bool),
    SessionsLoaded(Vec<SessionSummary>),
    Error(ApiError),
}
