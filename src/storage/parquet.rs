use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use polars::prelude::*;
use tracing::debug;

use super::StorageScan;

/// Parquet-backed storage. A location is a `.parquet` file or a directory of
/// `*.parquet` chunks; `file://` prefixes are accepted.
#[derive(Default)]
pub struct ParquetStorage {
    /// Relative locations resolve against this root when set.
    root: Option<PathBuf>,
    scans: AtomicU64,
}

impl ParquetStorage {
    pub fn new() -> Self { Self::default() }

    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self { root: Some(root.as_ref().to_path_buf()), scans: AtomicU64::new(0) }
    }

    fn resolve(&self, physical_location: &str) -> PathBuf {
        let trimmed = physical_location.strip_prefix("file://").unwrap_or(physical_location);
        let p = PathBuf::from(trimmed);
        match &self.root {
            Some(root) if p.is_relative() => root.join(p),
            _ => p,
        }
    }

    /// Scan target: the file itself, or a glob over the chunks of a directory.
    pub(crate) fn scan_target(&self, physical_location: &str) -> String {
        let path = self.resolve(physical_location);
        if path.is_dir() {
            path.join("*.parquet").to_string_lossy().into_owned()
        } else {
            path.to_string_lossy().into_owned()
        }
    }
}

impl StorageScan for ParquetStorage {
    fn scan(&self, physical_location: &str) -> PolarsResult<LazyFrame> {
        let target = self.scan_target(physical_location);
        debug!(target: "dcjoin::storage", "scan_parquet: location='{}' target='{}'", physical_location, target);
        self.scans.fetch_add(1, Ordering::Relaxed);
        LazyFrame::scan_parquet(PlPath::new(&target), ScanArgsParquet::default())
    }

    fn scan_count(&self) -> u64 { self.scans.load(Ordering::Relaxed) }
}
