//! Filtered loading of a single data collection.
//!
//! locate -> lazy scan -> pushdown (filters, projection, limit) -> collect ->
//! strip bookkeeping columns.

use std::sync::Arc;
use std::time::Instant;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{EngineCaches, TableLoadKey};
use crate::catalog::MetadataLookup;
use crate::error::{EngineError, EngineResult};
use crate::filters::{self, FilterDescriptor};
use crate::storage::StorageScan;

/// Extra pushdown applied to a single-table load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LoadOptions {
    #[serde(default)]
    pub select_columns: Option<Vec<String>>,
    #[serde(default)]
    pub limit_rows: Option<usize>,
}

impl LoadOptions {
    pub fn is_default(&self) -> bool { self.select_columns.is_none() && self.limit_rows.is_none() }

    /// Signature salt so different projections never share a cache entry.
    pub fn salt(&self) -> String {
        if self.is_default() { return String::new(); }
        format!("cols={:?};limit={:?}", self.select_columns, self.limit_rows)
    }
}

/// One table load.
#[derive(Debug, Clone, Copy)]
pub struct TableRequest<'a> {
    pub workflow_id: &'a str,
    pub data_collection_id: &'a str,
    pub filters: &'a [FilterDescriptor],
    pub options: &'a LoadOptions,
    pub token: Option<&'a str>,
}

impl<'a> TableRequest<'a> {
    /// Filters that target this request's data collection.
    pub fn own_filters(&self) -> Vec<FilterDescriptor> {
        self.filters.iter().filter(|f| f.data_collection_id == self.data_collection_id).cloned().collect()
    }
}

/// Anything that can produce the filtered table for a request. The executor
/// loads through this seam.
pub trait TableSource: Send + Sync {
    fn load_table(&self, req: &TableRequest<'_>) -> EngineResult<DataFrame>;
}

pub struct TableLoader {
    metadata: Arc<dyn MetadataLookup>,
    storage: Arc<dyn StorageScan>,
    internal_columns: Vec<String>,
}

impl TableLoader {
    pub fn new(metadata: Arc<dyn MetadataLookup>, storage: Arc<dyn StorageScan>, internal_columns: Vec<String>) -> Self {
        Self { metadata, storage, internal_columns }
    }

    pub fn storage(&self) -> &Arc<dyn StorageScan> { &self.storage }

    pub fn load(&self, req: &TableRequest<'_>) -> EngineResult<DataFrame> {
        let t0 = Instant::now();
        let (wf, dc) = (req.workflow_id, req.data_collection_id);
        let loc = self.metadata.locate(wf, dc, req.token)?;
        let location = loc.physical_location.trim();
        if location.is_empty() {
            return Err(EngineError::configuration(wf, format!("data collection '{}'", dc), "no storage location for data collection"));
        }
        let scan_ctx = || format!("scan of data collection '{}' at '{}'", dc, location);

        let mut lf = self.storage.scan(location).map_err(|e| EngineError::storage(scan_ctx(), e))?;

        let own = req.own_filters();
        if own.len() != req.filters.len() {
            debug!(target: "dcjoin::loader", "load: dc='{}' ignoring {} filters aimed at other data collections", dc, req.filters.len() - own.len());
        }
        let predicates = filters::compile(&own);
        let mut needed: Vec<String> = filters::referenced_columns(&own);
        if let Some(cols) = &req.options.select_columns {
            for c in cols { if !needed.contains(c) { needed.push(c.clone()); } }
        }
        if !needed.is_empty() {
            let schema = lf.collect_schema().map_err(|e| EngineError::storage(scan_ctx(), e))?;
            if let Some(missing) = needed.iter().find(|c| schema.get(c.as_str()).is_none()) {
                return Err(EngineError::configuration(
                    wf,
                    format!("data collection '{}'", dc),
                    format!("column '{}' not found in '{}'", missing, location),
                ));
            }
        }
        let n_predicates = predicates.len();
        if let Some(p) = filters::combine(predicates) {
            lf = lf.filter(p);
        }
        if let Some(cols) = &req.options.select_columns {
            lf = lf.select(cols.iter().map(|c| col(c.as_str())).collect::<Vec<Expr>>());
        }
        if let Some(n) = req.options.limit_rows {
            lf = lf.limit(IdxSize::try_from(n).unwrap_or(IdxSize::MAX));
        }

        let mut df = lf.collect().map_err(|e| EngineError::storage(scan_ctx(), e))?;
        for c in &self.internal_columns {
            if df.get_column_names().iter().any(|n| n.as_str() == c.as_str()) {
                df = df.drop(c.as_str()).map_err(|e| EngineError::storage(scan_ctx(), e))?;
            }
        }
        debug!(
            target: "dcjoin::loader",
            "load: workflow='{}' dc='{}' size_bytes={:?} predicates={} rows={} cols={} took={:?}",
            wf,
            dc,
            loc.size_bytes,
            n_predicates,
            df.height(),
            df.width(),
            t0.elapsed()
        );
        Ok(df)
    }
}

impl TableSource for TableLoader {
    fn load_table(&self, req: &TableRequest<'_>) -> EngineResult<DataFrame> { self.load(req) }
}

/// `TableLoader` behind the table-load cache.
pub struct CachedTableLoader {
    loader: Arc<TableLoader>,
    caches: Arc<EngineCaches>,
}

impl CachedTableLoader {
    pub fn new(loader: Arc<TableLoader>, caches: Arc<EngineCaches>) -> Self { Self { loader, caches } }

    pub fn key_for(req: &TableRequest<'_>) -> TableLoadKey {
        TableLoadKey {
            workflow_id: req.workflow_id.to_string(),
            data_collection_id: req.data_collection_id.to_string(),
            signature: filters::signature_with(&req.own_filters(), &req.options.salt()),
        }
    }

    pub fn inner(&self) -> &Arc<TableLoader> { &self.loader }
}

impl TableSource for CachedTableLoader {
    fn load_table(&self, req: &TableRequest<'_>) -> EngineResult<DataFrame> {
        let key = Self::key_for(req);
        self.caches.tables.get_or_try_insert_with(&key, || self.loader.load(req))
    }
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod loader_tests;
