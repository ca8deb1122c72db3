//!
//! dcjoin storage module
//! ---------------------
//! The engine never reads bytes itself: it asks a `StorageScan` for a lazy
//! handle over a physical location and lets polars push filters, projections
//! and limits into that scan before collecting.
//!
//! Two implementations ship with the crate:
//! - `ParquetStorage`: a single Parquet file, or a directory of Parquet chunks
//!   (`*.parquet`), opened with `LazyFrame::scan_parquet`.
//! - `MemoryStorage`: frames registered in memory under a location key.
//!
//! Both count the scans they open so callers can observe cache behaviour.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use polars::prelude::*;

mod parquet;

pub use parquet::ParquetStorage;

/// Opens a lazy scan over a physical location. Read-only.
pub trait StorageScan: Send + Sync {
    fn scan(&self, physical_location: &str) -> PolarsResult<LazyFrame>;

    /// Number of scans opened so far.
    fn scan_count(&self) -> u64 { 0 }
}

/// In-memory frames keyed by location.
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<HashMap<String, DataFrame>>,
    scans: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    pub fn insert<L: Into<String>>(&self, location: L, df: DataFrame) {
        self.tables.write().insert(location.into(), df);
    }

    pub fn with_table<L: Into<String>>(self, location: L, df: DataFrame) -> Self {
        self.insert(location, df);
        self
    }
}

impl StorageScan for MemoryStorage {
    fn scan(&self, physical_location: &str) -> PolarsResult<LazyFrame> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        match self.tables.read().get(physical_location) {
            Some(df) => Ok(df.clone().lazy()),
            None => Err(PolarsError::ComputeError(format!("no table registered at '{}'", physical_location).into())),
        }
    }

    fn scan_count(&self) -> u64 { self.scans.load(Ordering::Relaxed) }
}
