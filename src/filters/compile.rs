use polars::prelude::*;
use xxhash_rust::xxh3::xxh3_64;

use super::{Comparison, Constraint, FilterDescriptor, ScalarValue, TextMatch, TextPattern, ValueRange, ValueSet};

fn scalar_lit(v: &ScalarValue) -> Option<Expr> {
    match v {
        ScalarValue::Bool(b) => Some(lit(*b)),
        ScalarValue::Int(i) => Some(lit(*i)),
        ScalarValue::Float(f) => Some(lit(*f)),
        ScalarValue::Str(s) => Some(lit(s.clone())),
        ScalarValue::Null => None,
    }
}

fn membership(column: &str, set: &ValueSet) -> Option<Expr> {
    let expr = set
        .values
        .iter()
        .map(|v| match scalar_lit(v) {
            Some(l) => col(column).eq(l),
            None => col(column).is_null(),
        })
        .reduce(|a, b| a.or(b))?;
    Some(if set.negated { expr.not() } else { expr })
}

fn text_match(column: &str, p: &TextPattern) -> Option<Expr> {
    if p.text.is_empty() { return None; }
    let s = col(column).cast(DataType::String);
    let pat = lit(p.text.clone());
    Some(match p.mode {
        TextMatch::Pattern => {
            if regex::Regex::new(&p.text).is_ok() { s.str().contains(pat, false) } else { s.str().contains_literal(pat) }
        }
        TextMatch::Contains => s.str().contains_literal(pat),
        TextMatch::NotContains => s.str().contains_literal(pat).not(),
        TextMatch::StartsWith => s.str().starts_with(pat),
        TextMatch::EndsWith => s.str().ends_with(pat),
        TextMatch::Equals => s.eq(pat),
        TextMatch::NotEqual => s.neq(pat),
    })
}

fn threshold(column: &str, value: &ScalarValue, op: Comparison) -> Option<Expr> {
    let v = scalar_lit(value)?;
    let c = col(column);
    Some(match op {
        Comparison::Eq => c.eq(v),
        Comparison::Neq => c.neq(v),
        Comparison::Gt => c.gt(v),
        Comparison::Gte => c.gt_eq(v),
        Comparison::Lt => c.lt(v),
        Comparison::Lte => c.lt_eq(v),
    })
}

fn between(column: &str, range: &ValueRange) -> Option<Expr> {
    let lo = scalar_lit(&range.min)?;
    let hi = scalar_lit(&range.max)?;
    Some(col(column).gt_eq(lo).and(col(column).lt_eq(hi)))
}

/// Predicate for one descriptor, or None when the descriptor is inert
/// (empty selection, empty text, null slider, missing range).
pub fn compile_one(d: &FilterDescriptor) -> Option<Expr> {
    let column = d.column.as_str();
    match &d.constraint {
        Constraint::Select(set) | Constraint::MultiSelect(set) | Constraint::SegmentedControl(set) => membership(column, set),
        Constraint::TextInput(p) => text_match(column, p),
        Constraint::Slider(t) => threshold(column, &t.value, t.op),
        Constraint::RangeSlider(r) => r.as_ref().and_then(|r| between(column, r)),
    }
}

pub fn is_active(d: &FilterDescriptor) -> bool { compile_one(d).is_some() }

pub fn compile(descriptors: &[FilterDescriptor]) -> Vec<Expr> {
    descriptors.iter().filter_map(compile_one).collect()
}

/// AND fold; None means "no filter".
pub fn combine(predicates: Vec<Expr>) -> Option<Expr> {
    predicates.into_iter().reduce(|a, b| a.and(b))
}

/// Columns constrained by the active descriptors, deduplicated.
pub fn referenced_columns(descriptors: &[FilterDescriptor]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for d in descriptors.iter().filter(|d| is_active(d)) {
        if !out.contains(&d.column) { out.push(d.column.clone()); }
    }
    out
}

pub fn filter_signature(descriptors: &[FilterDescriptor]) -> String { signature_with(descriptors, "") }

/// Stable digest of the sorted active descriptors plus a caller supplied salt
/// (load options). Inert descriptors do not contribute.
pub fn signature_with(descriptors: &[FilterDescriptor], salt: &str) -> String {
    let mut parts: Vec<String> = descriptors
        .iter()
        .filter(|d| is_active(d))
        .map(|d| serde_json::to_string(d).unwrap_or_else(|_| format!("{:?}", d)))
        .collect();
    parts.sort();
    parts.dedup();
    let mut s = parts.join("\n");
    s.push('|');
    s.push_str(salt);
    format!("{:016x}", xxh3_64(s.as_bytes()))
}
