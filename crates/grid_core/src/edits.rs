//! Cell-edit interception: a changed value becomes an update request, never a
//! local mutation.

use std::sync::Arc;

use shared::{
    domain::EntityKind,
    protocol::{Metric, StoreCommand},
};
use tracing::warn;

use crate::{
    columns::{self, CellValue, Field},
    dispatch_command, StoreHandle,
};

/// Turns a cell-level change into an update request against the owning row.
pub struct EditCapture {
    store: Arc<dyn StoreHandle>,
}

impl EditCapture {
    pub fn new(store: Arc<dyn StoreHandle>) -> Self {
        Self { store }
    }

    /// Returns whether the grid may apply its own optimistic edit: always
    /// `false`. The visible value is a projection of store state and the
    /// authoritative re-render arrives through the row stream once the store
    /// confirms the update. Equal old and new values dispatch nothing.
    pub fn on_cell_value_changed(
        &self,
        field: Field,
        old_value: &CellValue,
        new_value: &CellValue,
        row: &Metric,
    ) -> bool {
        if old_value == new_value {
            return false;
        }

        let Some(entity) = columns::with_cell_value(row, field, new_value) else {
            warn!(
                field = field.entity_key().unwrap_or("selection"),
                "dropping edit with mismatched value shape"
            );
            return false;
        };

        dispatch_command(
            self.store.as_ref(),
            StoreCommand::UpdateEntity {
                entity,
                kind: EntityKind::Metric,
            },
        );

        false
    }
}
