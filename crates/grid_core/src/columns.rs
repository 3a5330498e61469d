//! Column policy: which fields are visible, editable, and how cells render.

use serde::Serialize;
use shared::{domain::CostObjectId, protocol::Metric};

use crate::{config::ViewConfig, reference::ReferenceCache};

const HEADER_NAME: &str = "Name";
const HEADER_DATA_TYPE: &str = "Data Type";
const HEADER_DATA_SIZE: &str = "Data Size";
const HEADER_DESCRIPTION: &str = "Description";
const HEADER_COLUMN_NAME: &str = "Column Name";
const HEADER_BUSINESS_DIMENSION: &str = "Business Dimension";

/// Fixed key/value list offered by the data-type editor. The stored key maps
/// to a display label; keys outside this table render blank, not as errors.
pub const DATA_TYPE_OPTIONS: &[(&str, &str)] = &[
    ("String", "Text"),
    ("Integer", "Whole number"),
    ("Decimal", "Decimal number"),
    ("Currency", "Currency"),
    ("Date", "Date"),
    ("Boolean", "Yes/No"),
];

pub fn data_type_label(key: &str) -> Option<&'static str> {
    DATA_TYPE_OPTIONS
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, label)| *label)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Selection,
    Name,
    DataType,
    DataSize,
    Description,
    ColumnName,
    BusinessDimension,
}

impl Field {
    /// Entity field key behind a column; the selection column carries none.
    pub fn entity_key(self) -> Option<&'static str> {
        match self {
            Self::Selection => None,
            Self::Name => Some("Name"),
            Self::DataType => Some("DataType"),
            Self::DataSize => Some("Size"),
            Self::Description => Some("Description"),
            Self::ColumnName => Some("ColumnName"),
            Self::BusinessDimension => Some("CostObjectId"),
        }
    }
}

/// Typed cell payload with value equality.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(i64),
    Reference(CostObjectId),
    Absent,
}

pub fn cell_value(metric: &Metric, field: Field) -> CellValue {
    match field {
        Field::Selection => CellValue::Absent,
        Field::Name => CellValue::Text(metric.name.clone()),
        Field::DataType => CellValue::Text(metric.data_type.clone()),
        Field::DataSize => CellValue::Number(metric.size),
        Field::Description => CellValue::Text(metric.description.clone()),
        Field::ColumnName => CellValue::Text(metric.column_name.clone()),
        Field::BusinessDimension => metric
            .cost_object_id
            .map(CellValue::Reference)
            .unwrap_or(CellValue::Absent),
    }
}

/// Snapshot of `metric` with only `field` replaced. `None` when the value
/// shape does not fit the field (or the field holds no entity data).
pub fn with_cell_value(metric: &Metric, field: Field, value: &CellValue) -> Option<Metric> {
    let mut updated = metric.clone();
    match (field, value) {
        (Field::Name, CellValue::Text(text)) => updated.name = text.clone(),
        (Field::DataType, CellValue::Text(text)) => updated.data_type = text.clone(),
        (Field::DataSize, CellValue::Number(number)) => updated.size = *number,
        (Field::Description, CellValue::Text(text)) => updated.description = text.clone(),
        (Field::ColumnName, CellValue::Text(text)) => updated.column_name = text.clone(),
        (Field::BusinessDimension, CellValue::Reference(id)) => {
            updated.cost_object_id = Some(*id);
        }
        (Field::BusinessDimension, CellValue::Absent) => updated.cost_object_id = None,
        _ => return None,
    }
    Some(updated)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorKind {
    /// Fixed data-type key/value list.
    DataTypeSelect,
    /// Live reference-cache options keyed by cost object id.
    CostObjectSelect,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectOption {
    pub id: String,
    pub label: String,
}

impl EditorKind {
    pub fn options(self, cache: &ReferenceCache) -> Vec<SelectOption> {
        match self {
            Self::DataTypeSelect => DATA_TYPE_OPTIONS
                .iter()
                .map(|(key, label)| SelectOption {
                    id: (*key).to_string(),
                    label: (*label).to_string(),
                })
                .collect(),
            Self::CostObjectSelect => cache
                .snapshot()
                .into_iter()
                .map(|item| SelectOption {
                    id: item.cost_object_id.0.to_string(),
                    label: item.name,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    DataTypeName,
    CostObjectName,
}

impl ValueFormat {
    /// `None` means a blank cell; an unresolvable cost-object reference falls
    /// back to the raw id rather than blanking or failing.
    pub fn render(self, metric: &Metric, cache: &ReferenceCache) -> Option<String> {
        match self {
            Self::DataTypeName => data_type_label(&metric.data_type).map(str::to_string),
            Self::CostObjectName => {
                let id = metric.cost_object_id?;
                Some(
                    cache
                        .display_name(id)
                        .unwrap_or_else(|| id.0.to_string()),
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub header: &'static str,
    pub field: Field,
    pub editable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editor: Option<EditorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatter: Option<ValueFormat>,
}

/// Pure function of the two mode flags. The selection column is never
/// editable; every data column follows the read-only flag; the Business
/// Dimension column exists only in partitioned scope.
pub fn build_columns(config: &ViewConfig) -> Vec<ColumnDescriptor> {
    let editable = !config.read_only;
    let mut columns = vec![
        ColumnDescriptor {
            header: "",
            field: Field::Selection,
            editable: false,
            editor: None,
            formatter: None,
        },
        ColumnDescriptor {
            header: HEADER_NAME,
            field: Field::Name,
            editable,
            editor: None,
            formatter: None,
        },
        ColumnDescriptor {
            header: HEADER_DATA_TYPE,
            field: Field::DataType,
            editable,
            editor: Some(EditorKind::DataTypeSelect),
            formatter: Some(ValueFormat::DataTypeName),
        },
        ColumnDescriptor {
            header: HEADER_DATA_SIZE,
            field: Field::DataSize,
            editable,
            editor: None,
            formatter: None,
        },
        ColumnDescriptor {
            header: HEADER_DESCRIPTION,
            field: Field::Description,
            editable,
            editor: None,
            formatter: None,
        },
        ColumnDescriptor {
            header: HEADER_COLUMN_NAME,
            field: Field::ColumnName,
            editable,
            editor: None,
            formatter: None,
        },
    ];

    if !config.scope.is_global() {
        columns.push(ColumnDescriptor {
            header: HEADER_BUSINESS_DIMENSION,
            field: Field::BusinessDimension,
            editable,
            editor: Some(EditorKind::CostObjectSelect),
            formatter: Some(ValueFormat::CostObjectName),
        });
    }

    columns
}

/// Rendered text for one cell, applying the column formatter when present.
pub fn render_cell(
    descriptor: &ColumnDescriptor,
    metric: &Metric,
    cache: &ReferenceCache,
) -> Option<String> {
    match descriptor.formatter {
        Some(format) => format.render(metric, cache),
        None => match cell_value(metric, descriptor.field) {
            CellValue::Text(text) => Some(text),
            CellValue::Number(number) => Some(number.to_string()),
            CellValue::Reference(id) => Some(id.0.to_string()),
            CellValue::Absent => None,
        },
    }
}
