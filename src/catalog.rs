//! External collaborator seams: metadata lookup and join catalog.
//!
//! The web layer normally backs both traits with its HTTP metadata API. This
//! module also provides `StaticCatalog`, a manifest-driven implementation used
//! by the `dcjoin` binary, embedders without a metadata service, and tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::model::{DataCollection, DataCollectionLocation, JoinDeclaration, JoinSpec};

/// Resolves a data collection id to its physical placement.
pub trait MetadataLookup: Send + Sync {
    fn locate(&self, workflow_id: &str, data_collection_id: &str, token: Option<&str>) -> EngineResult<DataCollectionLocation>;
}

/// Returns the declared joins of a workflow, in catalog order.
pub trait JoinCatalog: Send + Sync {
    fn joins_for_workflow(&self, workflow_id: &str, token: Option<&str>) -> EngineResult<Vec<JoinDeclaration>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WorkflowManifest {
    #[serde(default)]
    pub data_collections: Vec<DataCollection>,
    /// Pair key (`a--b`) -> join body.
    #[serde(default)]
    pub joins: BTreeMap<String, JoinSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Manifest {
    #[serde(default)]
    pub workflows: BTreeMap<String, WorkflowManifest>,
}

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    manifest: Manifest,
    /// Relative locations resolve against this directory when set.
    base_dir: Option<PathBuf>,
}

impl StaticCatalog {
    pub fn new(manifest: Manifest) -> Self { Self { manifest, base_dir: None } }

    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        let manifest: Manifest = serde_json::from_str(text)?;
        Ok(Self::new(manifest))
    }

    /// Load a manifest file; relative data collection locations are taken
    /// relative to the manifest's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut cat = Self::from_json_str(&text)?;
        cat.base_dir = path.parent().map(|p| p.to_path_buf());
        Ok(cat)
    }

    pub fn with_data_collection(mut self, workflow_id: &str, dc: DataCollection) -> Self {
        let wf = self.manifest.workflows.entry(workflow_id.to_string()).or_default();
        wf.data_collections.retain(|d| d.id != dc.id);
        wf.data_collections.push(dc);
        self
    }

    pub fn with_join(mut self, workflow_id: &str, decl: JoinDeclaration) -> Self {
        let wf = self.manifest.workflows.entry(workflow_id.to_string()).or_default();
        wf.joins.insert(decl.pair_key(), JoinSpec { kind: decl.kind, on: decl.on, tags: decl.tags });
        self
    }

    pub fn manifest(&self) -> &Manifest { &self.manifest }

    pub fn data_collection(&self, workflow_id: &str, data_collection_id: &str) -> Option<&DataCollection> {
        self.manifest.workflows.get(workflow_id)?.data_collections.iter().find(|d| d.id == data_collection_id)
    }

    fn resolve_location(&self, location: &str) -> String {
        if location.trim().is_empty() { return String::new(); }
        match &self.base_dir {
            Some(base) if Path::new(location).is_relative() => base.join(location).to_string_lossy().into_owned(),
            _ => location.to_string(),
        }
    }
}

impl MetadataLookup for StaticCatalog {
    fn locate(&self, workflow_id: &str, data_collection_id: &str, _token: Option<&str>) -> EngineResult<DataCollectionLocation> {
        let dc = self.data_collection(workflow_id, data_collection_id).ok_or_else(|| {
            EngineError::lookup(workflow_id, format!("data collection '{}'", data_collection_id), "unknown data collection")
        })?;
        debug!(target: "dcjoin::catalog", "locate: workflow='{}' dc='{}' location='{}'", workflow_id, data_collection_id, dc.location);
        Ok(DataCollectionLocation { physical_location: self.resolve_location(&dc.location), size_bytes: dc.size_bytes })
    }
}

impl JoinCatalog for StaticCatalog {
    fn joins_for_workflow(&self, workflow_id: &str, _token: Option<&str>) -> EngineResult<Vec<JoinDeclaration>> {
        let Some(wf) = self.manifest.workflows.get(workflow_id) else { return Ok(Vec::new()); };
        let mut out = Vec::with_capacity(wf.joins.len());
        for (key, spec) in &wf.joins {
            let decl = JoinDeclaration::from_pair_key(key, spec.clone()).ok_or_else(|| {
                EngineError::lookup(workflow_id, "join catalog", format!("malformed pair key '{}'", key))
            })?;
            out.push(decl);
        }
        Ok(out)
    }
}
