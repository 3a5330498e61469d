//! View configuration resolved from route data, scenario lock state and the
//! modify permission.

use shared::domain::ScopeKind;

/// Mode descriptor resolved from routing once, before first render.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteData {
    pub scope: ScopeKind,
    pub title: String,
}

/// Immutable per-resolution configuration. A change in lock state or
/// permission produces a new value via [`ViewConfig::resolve`], never an
/// in-place mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewConfig {
    pub scope: ScopeKind,
    pub read_only: bool,
}

impl ViewConfig {
    /// Streams that have not emitted yet leave the view editable: the grid
    /// starts unlocked and locks down once the scenario or permission says so.
    pub fn resolve(
        route: &RouteData,
        scenario_locked: Option<bool>,
        can_modify: Option<bool>,
    ) -> Self {
        let read_only = scenario_locked.unwrap_or(false) || !can_modify.unwrap_or(true);
        Self {
            scope: route.scope,
            read_only,
        }
    }
}
