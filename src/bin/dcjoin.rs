//! Run one `load` request against a manifest and print the resulting frame.
//!
//! Usage: dcjoin <manifest.json> <workflow_id> <data_collection_id> [filters.json]
//!
//! `filters.json` holds an array of widget states (flat or nested) or, under a
//! `{"grid": {"<dc_id>": <grid filter model>}}` object, grid filter models.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde_json::Value as JsonValue;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use dcjoin::filters::{normalize_grid_model, GridFilterModel};
use dcjoin::{DataEngine, EngineConfig, FilterDescriptor, ParquetStorage, StaticCatalog};

fn read_filters(path: &str) -> Result<Vec<FilterDescriptor>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading filters '{}'", path))?;
    let v: JsonValue = serde_json::from_str(&text).with_context(|| format!("parsing filters '{}'", path))?;
    match v {
        JsonValue::Array(states) => Ok(FilterDescriptor::from_widget_states(&states)),
        JsonValue::Object(mut obj) => {
            let grid = obj.remove("grid").ok_or_else(|| anyhow!("filters object must carry a 'grid' key"))?;
            let models: std::collections::BTreeMap<String, GridFilterModel> = serde_json::from_value(grid).context("invalid grid filter models")?;
            Ok(models.iter().flat_map(|(dc, m)| normalize_grid_model(dc, m)).collect())
        }
        _ => Err(anyhow!("filters must be an array of widget states or a grid object")),
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        return Err(anyhow!("usage: {} <manifest.json> <workflow_id> <data_collection_id> [filters.json]", args[0]));
    }
    let (manifest, workflow, dc) = (&args[1], &args[2], &args[3]);
    let filters = match args.get(4) {
        Some(p) => read_filters(p)?,
        None => Vec::new(),
    };

    let config = EngineConfig::from_env()?;
    info!(
        target: "dcjoin",
        "dcjoin: manifest='{}' workflow='{}' dc='{}' filters={} load_concurrency={} gap_fill={:?}",
        manifest, workflow, dc, filters.len(), config.load_concurrency, config.gap_fill
    );
    let catalog = Arc::new(StaticCatalog::from_file(manifest).with_context(|| format!("loading manifest '{}'", manifest))?);
    let engine = DataEngine::new(config, catalog.clone(), catalog, Arc::new(ParquetStorage::new()));

    let df = engine.load(workflow, dc, &filters, None).map_err(|e| anyhow!("[{}] {}", e.code_str(), e))?;
    println!("{}", df);
    Ok(())
}
