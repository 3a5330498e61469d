use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(MetricId);
id_newtype!(CostObjectId);
id_newtype!(ScenarioId);
id_newtype!(SessionId);
id_newtype!(TimePeriodId);
id_newtype!(UserId);

impl MetricId {
    /// Zero marks a row the store has not persisted yet.
    pub const UNSAVED: Self = Self(0);

    pub fn is_unsaved(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Partitioned,
    Global,
}

impl ScopeKind {
    pub fn is_global(self) -> bool {
        matches!(self, Self::Global)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Metric,
}
