pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod filters;
pub mod loader;
pub mod model;
pub mod resolver;
pub mod storage;

pub use cache::{CacheStats, EngineCaches, MemoCache};
pub use catalog::{JoinCatalog, MetadataLookup, StaticCatalog};
pub use config::{EngineConfig, GapFillPolicy};
pub use engine::DataEngine;
pub use error::{EngineError, EngineResult};
pub use filters::FilterDescriptor;
pub use loader::LoadOptions;
pub use model::{JoinDeclaration, JoinGroup, JoinKind, JoinPlan};
pub use storage::{MemoryStorage, ParquetStorage, StorageScan};

// Test-only printing helper: prints to stderr in test and debug builds.
// Usage: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In release builds tprintln! keeps format checking but produces no output.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}
