//! Grid filter model normalization.
//!
//! The table component reports filters per column as
//! `{ "<column>": { "filterType": "number", "type": "inRange", "filter": 1, "filterTo": 5 } }`,
//! optionally combining two conditions under `operator` + `conditions`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::{Comparison, Constraint, FilterDescriptor, ScalarValue, TextMatch, TextPattern, Threshold, ValueRange, ValueSet};

pub type GridFilterModel = BTreeMap<String, GridColumnFilter>;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GridColumnFilter {
    #[serde(default)]
    pub filter_type: Option<String>,
    #[serde(default, rename = "type")]
    pub op: Option<String>,
    #[serde(default)]
    pub filter: Option<JsonValue>,
    #[serde(default)]
    pub filter_to: Option<JsonValue>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub values: Option<Vec<JsonValue>>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub conditions: Vec<GridColumnFilter>,
}

impl GridColumnFilter {
    fn operand(&self) -> Option<ScalarValue> {
        if let Some(v) = &self.filter { return ScalarValue::from_json(v); }
        self.date_from.as_ref().map(|s| ScalarValue::Str(s.clone()))
    }

    fn operand_to(&self) -> Option<ScalarValue> {
        if let Some(v) = &self.filter_to { return ScalarValue::from_json(v); }
        self.date_to.as_ref().map(|s| ScalarValue::Str(s.clone()))
    }

    fn is_text(&self) -> bool { self.filter_type.as_deref() == Some("text") }
}

fn text_constraint(f: &GridColumnFilter, mode: TextMatch) -> Option<Constraint> {
    let text = match f.operand()? {
        ScalarValue::Str(s) => s,
        ScalarValue::Null => return None,
        ScalarValue::Int(i) => i.to_string(),
        ScalarValue::Float(x) => x.to_string(),
        ScalarValue::Bool(b) => b.to_string(),
    };
    Some(Constraint::TextInput(TextPattern { text, mode }))
}

fn slider_constraint(f: &GridColumnFilter, op: Comparison) -> Option<Constraint> {
    Some(Constraint::Slider(Threshold { value: f.operand()?, op }))
}

fn normalize_condition(column: &str, f: &GridColumnFilter) -> Option<Constraint> {
    if f.filter_type.as_deref() == Some("set") || f.values.is_some() {
        let values = f.values.as_deref().unwrap_or(&[]).iter().filter_map(ScalarValue::from_json).collect();
        return Some(Constraint::MultiSelect(ValueSet { values, negated: false }));
    }
    let op = f.op.as_deref().unwrap_or("");
    match op {
        "inRange" => {
            let range = match (f.operand(), f.operand_to()) {
                (Some(min), Some(max)) if !min.is_null() && !max.is_null() => Some(ValueRange { min, max }),
                _ => None,
            };
            Some(Constraint::RangeSlider(range))
        }
        "contains" => text_constraint(f, TextMatch::Contains),
        "notContains" => text_constraint(f, TextMatch::NotContains),
        "startsWith" => text_constraint(f, TextMatch::StartsWith),
        "endsWith" => text_constraint(f, TextMatch::EndsWith),
        "equals" if f.is_text() => text_constraint(f, TextMatch::Equals),
        "notEqual" if f.is_text() => text_constraint(f, TextMatch::NotEqual),
        "equals" => slider_constraint(f, Comparison::Eq),
        "notEqual" => slider_constraint(f, Comparison::Neq),
        "greaterThan" => slider_constraint(f, Comparison::Gt),
        "greaterThanOrEqual" => slider_constraint(f, Comparison::Gte),
        "lessThan" => slider_constraint(f, Comparison::Lt),
        "lessThanOrEqual" => slider_constraint(f, Comparison::Lte),
        "blank" => Some(Constraint::Select(ValueSet { values: vec![ScalarValue::Null], negated: false })),
        "notBlank" => Some(Constraint::Select(ValueSet { values: vec![ScalarValue::Null], negated: true })),
        other => {
            debug!(target: "dcjoin::filters", "grid filter: unsupported operator '{}' on column '{}' ignored", other, column);
            None
        }
    }
}

/// Flatten a grid filter model into descriptors targeting `data_collection_id`.
pub fn normalize_grid_model(data_collection_id: &str, model: &GridFilterModel) -> Vec<FilterDescriptor> {
    let mut out = Vec::new();
    for (column, f) in model {
        if !f.conditions.is_empty() {
            let operator = f.operator.as_deref().unwrap_or("AND");
            if !operator.eq_ignore_ascii_case("AND") {
                warn!(target: "dcjoin::filters", "grid filter: '{}' combination on column '{}' cannot be expressed as a conjunction; ignored", operator, column);
                continue;
            }
            for cond in &f.conditions {
                if let Some(c) = normalize_condition(column, cond) {
                    out.push(FilterDescriptor::new(data_collection_id, column.as_str(), c));
                }
            }
            continue;
        }
        if let Some(c) = normalize_condition(column, f) {
            out.push(FilterDescriptor::new(data_collection_id, column.as_str(), c));
        }
    }
    out
}
