//! Caller-facing entry point.
//!
//! `DataEngine::load` answers "give me data collection X, filtered by these
//! interactive constraints". Constraints on other data collections pull those
//! tables into a join with X when the workflow declares a path between them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use polars::prelude::*;
use tracing::{debug, warn};

use crate::cache::{EngineCaches, JoinResultKey};
use crate::catalog::{JoinCatalog, MetadataLookup};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::executor::JoinExecutor;
use crate::filters::{self, FilterDescriptor};
use crate::loader::{CachedTableLoader, LoadOptions, TableLoader, TableRequest, TableSource};
use crate::model::{JoinDeclaration, JoinGroup};
use crate::resolver::JoinGraphResolver;
use crate::storage::StorageScan;

pub struct DataEngine {
    config: EngineConfig,
    catalog: Arc<dyn JoinCatalog>,
    tables: CachedTableLoader,
    caches: Arc<EngineCaches>,
    resolver: JoinGraphResolver,
    executor: JoinExecutor,
}

impl DataEngine {
    pub fn new(
        config: EngineConfig,
        metadata: Arc<dyn MetadataLookup>,
        catalog: Arc<dyn JoinCatalog>,
        storage: Arc<dyn StorageScan>,
    ) -> Self {
        let caches = Arc::new(EngineCaches::new(&config));
        Self::with_caches(config, metadata, catalog, storage, caches)
    }

    /// Build an engine around caches owned by the caller (shared between
    /// engines, or inspected by tests).
    pub fn with_caches(
        config: EngineConfig,
        metadata: Arc<dyn MetadataLookup>,
        catalog: Arc<dyn JoinCatalog>,
        storage: Arc<dyn StorageScan>,
        caches: Arc<EngineCaches>,
    ) -> Self {
        let loader = Arc::new(TableLoader::new(metadata, storage, config.internal_columns.clone()));
        let tables = CachedTableLoader::new(loader, caches.clone());
        let resolver = JoinGraphResolver::new(config.gap_fill);
        let executor = JoinExecutor::new(config.load_concurrency);
        Self { config, catalog, tables, caches, resolver, executor }
    }

    pub fn config(&self) -> &EngineConfig { &self.config }
    pub fn caches(&self) -> &Arc<EngineCaches> { &self.caches }
    pub fn clear_caches(&self) { self.caches.clear() }

    pub fn load(&self, workflow_id: &str, data_collection_id: &str, filters: &[FilterDescriptor], token: Option<&str>) -> EngineResult<DataFrame> {
        self.load_with_options(workflow_id, data_collection_id, filters, &LoadOptions::default(), token)
    }

    /// Load `data_collection_id`, joined with every data collection targeted
    /// by an active filter.
    pub fn load_with_options(
        &self,
        workflow_id: &str,
        data_collection_id: &str,
        filters: &[FilterDescriptor],
        options: &LoadOptions,
        token: Option<&str>,
    ) -> EngineResult<DataFrame> {
        let t0 = Instant::now();
        let active: Vec<FilterDescriptor> = filters.iter().filter(|f| filters::is_active(f)).cloned().collect();
        let participants = participants_for(data_collection_id, &active);
        if participants.len() == 1 {
            return self.load_table(workflow_id, data_collection_id, &active, options, token);
        }

        let key = JoinResultKey::new(workflow_id, data_collection_id, &participants, filters::signature_with(&active, &options.salt()));
        if let Some(df) = self.caches.results.get(&key) {
            debug!(target: "dcjoin::engine", "load: workflow='{}' dc='{}' join result cache hit", workflow_id, data_collection_id);
            return Ok(df);
        }

        let Some(catalog) = self.join_catalog(workflow_id, token)? else {
            // degraded: target alone, result not cached
            return self.load_table(workflow_id, data_collection_id, &active, options, token);
        };

        let groups = self.resolver.resolve(workflow_id, &participants, &catalog);
        let selection = self.resolver.select_group(workflow_id, data_collection_id, groups, &catalog)?;
        let group = selection.group;
        if group.is_singleton() {
            let df = self.load_table(workflow_id, data_collection_id, &active, options, token)?;
            self.caches.results.set(key, df.clone());
            return Ok(df);
        }

        let mut by_dc: HashMap<String, Vec<FilterDescriptor>> = HashMap::new();
        for f in active.into_iter().filter(|f| group.contains(&f.data_collection_id)) {
            by_dc.entry(f.data_collection_id.clone()).or_default().push(f);
        }
        let joined = self.executor.execute(workflow_id, &group.plan, &by_dc, &self.tables, token)?;
        let df = apply_options(workflow_id, data_collection_id, joined, options)?;
        debug!(
            target: "dcjoin::engine",
            "load: workflow='{}' dc='{}' group={} detached={:?} rows={} took={:?}",
            workflow_id,
            data_collection_id,
            group.key(),
            selection.detached,
            df.height(),
            t0.elapsed()
        );
        self.caches.results.set(key, df.clone());
        Ok(df)
    }

    /// The cached single-table path; filters aimed at other tables are ignored.
    pub fn load_table(
        &self,
        workflow_id: &str,
        data_collection_id: &str,
        filters: &[FilterDescriptor],
        options: &LoadOptions,
        token: Option<&str>,
    ) -> EngineResult<DataFrame> {
        let req = TableRequest { workflow_id, data_collection_id, filters, options, token };
        self.tables.load_table(&req)
    }

    /// Join groups of `participants` under the workflow's catalog. A failed
    /// catalog lookup yields one singleton group per participant.
    pub fn resolve_join_groups(&self, workflow_id: &str, participants: &[String], token: Option<&str>) -> EngineResult<Vec<JoinGroup>> {
        let catalog = self.join_catalog(workflow_id, token)?.unwrap_or_default();
        Ok(self.resolver.resolve(workflow_id, participants, &catalog))
    }

    /// Cached join catalog; None when the lookup failed and the caller should
    /// proceed without joins.
    fn join_catalog(&self, workflow_id: &str, token: Option<&str>) -> EngineResult<Option<Vec<JoinDeclaration>>> {
        let key = workflow_id.to_string();
        if let Some(c) = self.caches.catalogs.get(&key) { return Ok(Some(c)); }
        match self.catalog.joins_for_workflow(workflow_id, token) {
            Ok(c) => {
                self.caches.catalogs.set(key, c.clone());
                Ok(Some(c))
            }
            Err(e) if e.is_lookup() => {
                warn!(target: "dcjoin::engine", "workflow='{}': join catalog unavailable, continuing without joins: {}", workflow_id, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// The requested table first, then every other filtered table once, in filter order.
fn participants_for(target: &str, active: &[FilterDescriptor]) -> Vec<String> {
    let mut out = vec![target.to_string()];
    for f in active {
        if !out.contains(&f.data_collection_id) { out.push(f.data_collection_id.clone()); }
    }
    out
}

fn apply_options(workflow_id: &str, data_collection_id: &str, df: DataFrame, options: &LoadOptions) -> EngineResult<DataFrame> {
    let mut df = df;
    if let Some(cols) = &options.select_columns {
        if let Some(missing) = cols.iter().find(|c| df.column(c.as_str()).is_err()) {
            return Err(EngineError::configuration(
                workflow_id,
                format!("data collection '{}'", data_collection_id),
                format!("column '{}' not found in joined result", missing),
            ));
        }
        df = df.select(cols.iter().map(String::as_str)).map_err(|e| EngineError::storage("projection of joined result", e))?;
    }
    if let Some(n) = options.limit_rows {
        df = df.head(Some(n));
    }
    Ok(df)
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
