//!
//! dcjoin filters module
//! ---------------------
//! Interactive constraints arrive from the dashboard in two shapes: widget state
//! (flat or nested under `metadata`) and grid filter models. Both are normalized
//! here into a single `FilterDescriptor` type at the boundary, so nothing deeper
//! in the pipeline ever branches on the incoming JSON shape.
//!
//! `compile` turns descriptors into polars predicates; `filter_signature` turns
//! them into a stable cache key component.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

mod compile;
mod grid;

pub use compile::{combine, compile, compile_one, filter_signature, is_active, referenced_columns, signature_with};
pub use grid::{normalize_grid_model, GridColumnFilter, GridFilterModel};

/// A literal operand of a constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

impl ScalarValue {
    pub fn is_null(&self) -> bool { matches!(self, ScalarValue::Null) }

    pub fn from_json(v: &JsonValue) -> Option<Self> {
        match v {
            JsonValue::Null => Some(ScalarValue::Null),
            JsonValue::Bool(b) => Some(ScalarValue::Bool(*b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() { Some(ScalarValue::Int(i)) } else { n.as_f64().map(ScalarValue::Float) }
            }
            JsonValue::String(s) => Some(ScalarValue::Str(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }
}

impl From<i64> for ScalarValue { fn from(v: i64) -> Self { ScalarValue::Int(v) } }
impl From<f64> for ScalarValue { fn from(v: f64) -> Self { ScalarValue::Float(v) } }
impl From<bool> for ScalarValue { fn from(v: bool) -> Self { ScalarValue::Bool(v) } }
impl From<&str> for ScalarValue { fn from(v: &str) -> Self { ScalarValue::Str(v.to_string()) } }
impl From<String> for ScalarValue { fn from(v: String) -> Self { ScalarValue::Str(v) } }

/// Membership set for choice widgets. A `Null` member matches missing values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ValueSet {
    pub values: Vec<ScalarValue>,
    #[serde(default)]
    pub negated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextMatch {
    /// Regex when the text compiles as one, literal substring otherwise.
    #[default]
    Pattern,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Equals,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TextPattern {
    pub text: String,
    #[serde(default)]
    pub mode: TextMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    #[default]
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub value: ScalarValue,
    #[serde(default)]
    pub op: Comparison,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: ScalarValue,
    pub max: ScalarValue,
}

/// The constraint of one descriptor, tagged by the widget kind that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "widget", content = "value")]
pub enum Constraint {
    Select(ValueSet),
    MultiSelect(ValueSet),
    SegmentedControl(ValueSet),
    TextInput(TextPattern),
    Slider(Threshold),
    RangeSlider(Option<ValueRange>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Select,
    MultiSelect,
    SegmentedControl,
    TextInput,
    Slider,
    RangeSlider,
}

impl WidgetKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Select" => Some(WidgetKind::Select),
            "MultiSelect" => Some(WidgetKind::MultiSelect),
            "SegmentedControl" => Some(WidgetKind::SegmentedControl),
            "TextInput" => Some(WidgetKind::TextInput),
            "Slider" => Some(WidgetKind::Slider),
            "RangeSlider" => Some(WidgetKind::RangeSlider),
            _ => None,
        }
    }
}

/// One interactive constraint on one column of one data collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub data_collection_id: String,
    pub column: String,
    pub constraint: Constraint,
}

impl FilterDescriptor {
    pub fn new<D: Into<String>, C: Into<String>>(data_collection_id: D, column: C, constraint: Constraint) -> Self {
        Self { data_collection_id: data_collection_id.into(), column: column.into(), constraint }
    }

    pub fn select<D: Into<String>, C: Into<String>, V: Into<ScalarValue>>(dc: D, column: C, values: Vec<V>) -> Self {
        Self::new(dc, column, Constraint::Select(ValueSet { values: values.into_iter().map(Into::into).collect(), negated: false }))
    }

    pub fn text<D: Into<String>, C: Into<String>>(dc: D, column: C, text: &str) -> Self {
        Self::new(dc, column, Constraint::TextInput(TextPattern { text: text.to_string(), mode: TextMatch::Pattern }))
    }

    pub fn slider<D: Into<String>, C: Into<String>, V: Into<ScalarValue>>(dc: D, column: C, value: V) -> Self {
        Self::new(dc, column, Constraint::Slider(Threshold { value: value.into(), op: Comparison::Eq }))
    }

    pub fn range<D: Into<String>, C: Into<String>, V: Into<ScalarValue>>(dc: D, column: C, min: V, max: V) -> Self {
        Self::new(dc, column, Constraint::RangeSlider(Some(ValueRange { min: min.into(), max: max.into() })))
    }

    /// Normalize one widget state object, flat or nested. Unsupported widget
    /// kinds and malformed objects yield None.
    pub fn from_widget_state(state: &JsonValue) -> Option<Self> {
        let parsed: WidgetState = match serde_json::from_value(state.clone()) {
            Ok(p) => p,
            Err(e) => {
                debug!(target: "dcjoin::filters", "from_widget_state: unparseable state ({}): {}", e, state);
                return None;
            }
        };
        let (meta, value) = match parsed {
            WidgetState::Nested { metadata, value } => (metadata, value),
            WidgetState::Flat { metadata, value } => (metadata, value),
        };
        let Some(kind) = WidgetKind::parse(&meta.widget) else {
            debug!(target: "dcjoin::filters", "from_widget_state: unsupported widget '{}' on column '{}' ignored", meta.widget, meta.column);
            return None;
        };
        Some(Self::new(meta.data_collection_id, meta.column, constraint_from_json(kind, &value)))
    }

    /// Normalize a list of widget states, dropping the ones that do not apply.
    pub fn from_widget_states(states: &[JsonValue]) -> Vec<Self> {
        states.iter().filter_map(Self::from_widget_state).collect()
    }
}

#[derive(Debug, Deserialize)]
struct WidgetMetadata {
    #[serde(alias = "dc_id")]
    data_collection_id: String,
    #[serde(alias = "column_name")]
    column: String,
    #[serde(alias = "interactive_component_type", alias = "widget_kind")]
    widget: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WidgetState {
    Nested {
        metadata: WidgetMetadata,
        #[serde(default)]
        value: JsonValue,
    },
    Flat {
        #[serde(flatten)]
        metadata: WidgetMetadata,
        #[serde(default)]
        value: JsonValue,
    },
}

fn scalars_from_json(v: &JsonValue) -> Vec<ScalarValue> {
    match v {
        JsonValue::Null => Vec::new(),
        JsonValue::Array(items) => items.iter().filter_map(ScalarValue::from_json).collect(),
        other => ScalarValue::from_json(other).into_iter().collect(),
    }
}

fn constraint_from_json(kind: WidgetKind, v: &JsonValue) -> Constraint {
    match kind {
        WidgetKind::Select => Constraint::Select(ValueSet { values: scalars_from_json(v), negated: false }),
        WidgetKind::MultiSelect => Constraint::MultiSelect(ValueSet { values: scalars_from_json(v), negated: false }),
        WidgetKind::SegmentedControl => Constraint::SegmentedControl(ValueSet { values: scalars_from_json(v), negated: false }),
        WidgetKind::TextInput => {
            let text = match v {
                JsonValue::String(s) => s.clone(),
                JsonValue::Null => String::new(),
                other => other.to_string(),
            };
            Constraint::TextInput(TextPattern { text, mode: TextMatch::Pattern })
        }
        WidgetKind::Slider => Constraint::Slider(Threshold { value: ScalarValue::from_json(v).unwrap_or(ScalarValue::Null), op: Comparison::Eq }),
        WidgetKind::RangeSlider => {
            let range = match v {
                JsonValue::Array(items) if items.len() == 2 => {
                    match (ScalarValue::from_json(&items[0]), ScalarValue::from_json(&items[1])) {
                        (Some(min), Some(max)) if !min.is_null() && !max.is_null() => Some(ValueRange { min, max }),
                        _ => None,
                    }
                }
                _ => None,
            };
            Constraint::RangeSlider(range)
        }
    }
}
