//! Engine configuration.
//!
//! Precedence: environment variables over a JSON file over built-in defaults.
//! Every field has a default so a partial JSON document is valid.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

pub const ENV_CONFIG_PATH: &str = "DCJOIN_CONFIG";
pub const ENV_LOAD_CONCURRENCY: &str = "DCJOIN_LOAD_CONCURRENCY";
pub const ENV_GAP_FILL: &str = "DCJOIN_GAP_FILL";
pub const ENV_INTERNAL_COLUMNS: &str = "DCJOIN_INTERNAL_COLUMNS";
pub const ENV_CACHE_MAX_ENTRIES: &str = "DCJOIN_CACHE_MAX_ENTRIES";
pub const ENV_CACHE_TTL_MS: &str = "DCJOIN_CACHE_TTL_MS";

/// What to do when a filtered data collection has no declared join path to
/// the requested one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GapFillPolicy {
    /// Fail with a configuration error naming the pair.
    #[default]
    Reject,
    /// Drop the unconnected data collections and their filters.
    Ignore,
    /// Join through a placeholder built from the first known declaration of
    /// the workflow. Only correct when every join of the workflow shares its keys.
    ReuseKnownDeclaration,
}

impl GapFillPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Some(GapFillPolicy::Reject),
            "ignore" => Some(GapFillPolicy::Ignore),
            "reuse_known_declaration" | "reuse" => Some(GapFillPolicy::ReuseKnownDeclaration),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Oldest-inserted entries are evicted beyond this size. None = unbounded.
    pub max_entries: Option<usize>,
    /// Entries older than this are treated as absent. None = no expiry.
    pub ttl_ms: Option<u64>,
    /// Serialize concurrent misses for the same key so the work runs once.
    pub single_flight: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { enabled: true, max_entries: None, ttl_ms: None, single_flight: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads used to load the tables of one join plan.
    pub load_concurrency: usize,
    /// Bookkeeping columns stripped from every loaded table.
    pub internal_columns: Vec<String>,
    pub gap_fill: GapFillPolicy,
    pub table_cache: CacheSettings,
    pub catalog_cache: CacheSettings,
    pub result_cache: CacheSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            load_concurrency: 4,
            internal_columns: vec!["aggregation_time".to_string()],
            gap_fill: GapFillPolicy::Reject,
            table_cache: CacheSettings { single_flight: true, ..CacheSettings::default() },
            catalog_cache: CacheSettings::default(),
            result_cache: CacheSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid engine config JSON")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Defaults, overlaid by the file named in `DCJOIN_CONFIG`, overlaid by the
    /// individual `DCJOIN_*` variables.
    pub fn from_env() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) if !p.trim().is_empty() => Self::from_file(p.trim())?,
            _ => Self::default(),
        };
        cfg.apply_overrides(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Apply `DCJOIN_*` overrides read through `get`.
    pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, get: F) -> Result<()> {
        if let Some(v) = get(ENV_LOAD_CONCURRENCY) {
            let n: usize = v.trim().parse().with_context(|| format!("{}='{}'", ENV_LOAD_CONCURRENCY, v))?;
            self.load_concurrency = n.max(1);
        }
        if let Some(v) = get(ENV_GAP_FILL) {
            self.gap_fill = GapFillPolicy::parse(&v).ok_or_else(|| anyhow!("{}: unknown policy '{}'", ENV_GAP_FILL, v))?;
        }
        if let Some(v) = get(ENV_INTERNAL_COLUMNS) {
            self.internal_columns = v.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()).map(String::from).collect();
        }
        if let Some(v) = get(ENV_CACHE_MAX_ENTRIES) {
            let n: usize = v.trim().parse().with_context(|| format!("{}='{}'", ENV_CACHE_MAX_ENTRIES, v))?;
            for c in [&mut self.table_cache, &mut self.catalog_cache, &mut self.result_cache] { c.max_entries = Some(n); }
        }
        if let Some(v) = get(ENV_CACHE_TTL_MS) {
            let ms: u64 = v.trim().parse().with_context(|| format!("{}='{}'", ENV_CACHE_TTL_MS, v))?;
            for c in [&mut self.table_cache, &mut self.catalog_cache, &mut self.result_cache] { c.ttl_ms = Some(ms); }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.load_concurrency, 4);
        assert_eq!(cfg.gap_fill, GapFillPolicy::Reject);
        assert_eq!(cfg.internal_columns, vec!["aggregation_time".to_string()]);
        assert!(cfg.table_cache.single_flight);
        assert!(!cfg.result_cache.single_flight);
        assert_eq!(cfg.result_cache.max_entries, None);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{"gap_fill": "ignore", "result_cache": {"max_entries": 8}}"#).unwrap();
        assert_eq!(cfg.gap_fill, GapFillPolicy::Ignore);
        assert_eq!(cfg.result_cache.max_entries, Some(8));
        assert!(cfg.result_cache.enabled);
        assert_eq!(cfg.load_concurrency, 4);
    }

    #[test]
    fn precedence_env_over_file_over_default() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("engine.json");
        std::fs::write(&path, r#"{"load_concurrency": 2, "gap_fill": "ignore"}"#).unwrap();
        let mut cfg = EngineConfig::from_file(&path).unwrap();
        assert_eq!(cfg.load_concurrency, 2);

        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_LOAD_CONCURRENCY, "8"),
            (ENV_INTERNAL_COLUMNS, "aggregation_time, _ingested_at"),
            (ENV_CACHE_TTL_MS, "5000"),
        ]);
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.load_concurrency, 8);
        assert_eq!(cfg.gap_fill, GapFillPolicy::Ignore);
        assert_eq!(cfg.internal_columns, vec!["aggregation_time".to_string(), "_ingested_at".to_string()]);
        assert_eq!(cfg.table_cache.ttl_ms, Some(5000));
        assert_eq!(cfg.catalog_cache.ttl_ms, Some(5000));
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let mut cfg = EngineConfig::default();
        assert!(cfg.apply_overrides(|k| (k == ENV_GAP_FILL).then(|| "sometimes".to_string())).is_err());
        assert!(cfg.apply_overrides(|k| (k == ENV_LOAD_CONCURRENCY).then(|| "many".to_string())).is_err());
        assert_eq!(GapFillPolicy::parse("REUSE"), Some(GapFillPolicy::ReuseKnownDeclaration));
    }
}
