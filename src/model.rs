//! Core data model shared by the resolver, loader and executor.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Separator used in persisted pair keys such as `dc1--dc2`.
pub const PAIR_KEY_SEPARATOR: &str = "--";

/// A logical columnar table published by a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataCollection {
    pub id: String,
    /// Parquet file, directory of Parquet chunks, or a key understood by the configured storage.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    /// Declared column schema, column name -> type name.
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

/// Physical placement of a data collection as reported by the metadata collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataCollectionLocation {
    pub physical_location: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    #[serde(alias = "outer")]
    Full,
}

impl JoinKind {
    /// The equivalent kind once the two sides of a join are swapped.
    pub fn flipped(self) -> Self {
        match self {
            JoinKind::Left => JoinKind::Right,
            JoinKind::Right => JoinKind::Left,
            other => other,
        }
    }

    pub fn to_polars(self) -> polars::prelude::JoinType {
        match self {
            JoinKind::Inner => polars::prelude::JoinType::Inner,
            JoinKind::Left => polars::prelude::JoinType::Left,
            JoinKind::Right => polars::prelude::JoinType::Right,
            JoinKind::Full => polars::prelude::JoinType::Full,
        }
    }
}

impl Display for JoinKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Full => "full",
        };
        f.write_str(s)
    }
}

/// Persisted body of a join declaration, keyed externally by `left--right`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct JoinSpec {
    #[serde(default, alias = "how")]
    pub kind: JoinKind,
    #[serde(default, alias = "on_columns")]
    pub on: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A declared equi-join between two data collections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinDeclaration {
    pub left: String,
    pub right: String,
    pub kind: JoinKind,
    pub on: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl JoinDeclaration {
    pub fn new<L: Into<String>, R: Into<String>>(left: L, right: R, kind: JoinKind, on: &[&str]) -> Self {
        Self { left: left.into(), right: right.into(), kind, on: on.iter().map(|s| s.to_string()).collect(), tags: Vec::new() }
    }

    /// Build from a persisted `a--b` key and its body. Returns None for malformed keys.
    pub fn from_pair_key(key: &str, spec: JoinSpec) -> Option<Self> {
        let (left, right) = split_pair_key(key)?;
        Some(Self { left, right, kind: spec.kind, on: spec.on, tags: spec.tags })
    }

    pub fn pair_key(&self) -> String { pair_key(&self.left, &self.right) }

    /// Order-independent identity of the pair.
    pub fn unordered_key(&self) -> (String, String) {
        if self.left <= self.right { (self.left.clone(), self.right.clone()) } else { (self.right.clone(), self.left.clone()) }
    }

    pub fn touches(&self, id: &str) -> bool { self.left == id || self.right == id }
}

pub fn pair_key(left: &str, right: &str) -> String { format!("{}{}{}", left, PAIR_KEY_SEPARATOR, right) }

pub fn split_pair_key(key: &str) -> Option<(String, String)> {
    let (l, r) = key.split_once(PAIR_KEY_SEPARATOR)?;
    let (l, r) = (l.trim(), r.trim());
    if l.is_empty() || r.is_empty() || l == r { return None; }
    Some((l.to_string(), r.to_string()))
}

/// One merge instruction of a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinStep {
    pub left: String,
    pub right: String,
    pub kind: JoinKind,
    /// Equality columns. Empty means merge on the columns both tables share.
    pub on: Vec<String>,
    /// Synthesized by gap filling rather than declared.
    #[serde(default)]
    pub placeholder: bool,
}

impl From<&JoinDeclaration> for JoinStep {
    fn from(d: &JoinDeclaration) -> Self {
        JoinStep { left: d.left.clone(), right: d.right.clone(), kind: d.kind, on: d.on.clone(), placeholder: false }
    }
}

/// Ordered steps; after the first, every step touches an already merged table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct JoinPlan {
    pub steps: Vec<JoinStep>,
}

impl JoinPlan {
    pub fn is_empty(&self) -> bool { self.steps.is_empty() }

    /// Distinct data collection ids in first-appearance order.
    pub fn table_ids(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for s in &self.steps {
            for id in [&s.left, &s.right] {
                if !out.iter().any(|x| x == id) { out.push(id.clone()); }
            }
        }
        out
    }
}

/// A connected component of data collections under the declared join relation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct JoinGroup {
    /// Sorted member ids; doubles as the group key.
    pub members: Vec<String>,
    pub plan: JoinPlan,
}

impl JoinGroup {
    pub fn key(&self) -> String { self.members.join(",") }
    pub fn contains(&self, id: &str) -> bool { self.members.binary_search_by(|m| m.as_str().cmp(id)).is_ok() }
    pub fn is_singleton(&self) -> bool { self.members.len() <= 1 }
}
