use super::*;
use crate::catalog::StaticCatalog;
use crate::config::GapFillPolicy;
use crate::filters::{Comparison, Constraint, Threshold};
use crate::model::{DataCollection, DataCollectionLocation, JoinKind};
use crate::storage::MemoryStorage;

struct DownCatalog;

impl JoinCatalog for DownCatalog {
    fn joins_for_workflow(&self, workflow_id: &str, _token: Option<&str>) -> EngineResult<Vec<JoinDeclaration>> {
        Err(EngineError::lookup(workflow_id, "join catalog", "metadata service unavailable"))
    }
}

struct BrokenCatalog;

impl JoinCatalog for BrokenCatalog {
    fn joins_for_workflow(&self, _workflow_id: &str, _token: Option<&str>) -> EngineResult<Vec<JoinDeclaration>> {
        Err(EngineError::invariant("catalog returned garbage"))
    }
}

fn dc(id: &str) -> DataCollection {
    DataCollection { id: id.into(), location: format!("mem://{}", id), size_bytes: None, columns: Default::default() }
}

fn storage() -> Arc<MemoryStorage> {
    Arc::new(
        MemoryStorage::new()
            .with_table("mem://dc1", df!("sample" => ["s1", "s2", "s3"], "site" => ["A", "B", "A"], "aggregation_time" => [0i64, 0, 0]).unwrap())
            .with_table("mem://dc2", df!("sample" => ["s1", "s2", "s3"], "run" => ["r1", "r2", "r3"]).unwrap())
            .with_table("mem://dc3", df!("run" => ["r1", "r2", "r3"], "qc" => [0.9f64, 0.4, 0.8]).unwrap())
            .with_table("mem://dc4", df!("other" => [1i64]).unwrap())
            .with_table("mem://dc5", df!("sample" => ["s1", "s2"], "batch" => ["b1", "b2"]).unwrap()),
    )
}

fn catalog() -> StaticCatalog {
    StaticCatalog::default()
        .with_data_collection("wf", dc("dc1"))
        .with_data_collection("wf", dc("dc2"))
        .with_data_collection("wf", dc("dc3"))
        .with_data_collection("wf", dc("dc4"))
        .with_data_collection("wf", dc("dc5"))
        .with_join("wf", JoinDeclaration::new("dc1", "dc2", JoinKind::Inner, &["sample"]))
        .with_join("wf", JoinDeclaration::new("dc2", "dc3", JoinKind::Inner, &["run"]))
}

fn engine_with(config: EngineConfig, joins: Arc<dyn JoinCatalog>) -> (DataEngine, Arc<MemoryStorage>) {
    let storage = storage();
    let engine = DataEngine::new(config, Arc::new(catalog()), joins, storage.clone());
    (engine, storage)
}

fn engine() -> (DataEngine, Arc<MemoryStorage>) { engine_with(EngineConfig::default(), Arc::new(catalog())) }

#[test]
fn single_table_load_is_cached() {
    let (engine, storage) = engine();
    let f = vec![FilterDescriptor::select("dc1", "site", vec!["A"])];
    let a = engine.load("wf", "dc1", &f, None).unwrap();
    let b = engine.load("wf", "dc1", &f, None).unwrap();
    assert_eq!(a.height(), 2);
    assert!(a.equals(&b));
    assert!(a.column("aggregation_time").is_err());
    assert_eq!(storage.scan_count(), 1);
}

#[test]
fn filters_across_chained_tables() {
    let (engine, storage) = engine();
    let f = vec![
        FilterDescriptor::select("dc2", "run", vec!["r1", "r2", "r3"]),
        FilterDescriptor::new("dc3", "qc", Constraint::Slider(Threshold { value: 0.5f64.into(), op: Comparison::Gte })),
    ];
    let df = engine.load("wf", "dc1", &f, None).unwrap();
    assert_eq!(df.height(), 2);
    assert_eq!(storage.scan_count(), 3);

    // same request again is served by the result cache
    let again = engine.load("wf", "dc1", &f, None).unwrap();
    assert!(df.equals(&again));
    assert_eq!(storage.scan_count(), 3);
    assert_eq!(engine.caches().results.len(), 1);

    engine.clear_caches();
    engine.load("wf", "dc1", &f, None).unwrap();
    assert_eq!(storage.scan_count(), 6);
}

#[test]
fn options_apply_to_joined_result() {
    let (engine, _) = engine();
    let f = vec![FilterDescriptor::select("dc2", "run", vec!["r1", "r3"])];
    let opts = LoadOptions { select_columns: Some(vec!["sample".into(), "run".into()]), limit_rows: Some(1) };
    let df = engine.load_with_options("wf", "dc1", &f, &opts, None).unwrap();
    assert_eq!(df.shape(), (1, 2));

    let bad = LoadOptions { select_columns: Some(vec!["nope".into()]), limit_rows: None };
    assert_eq!(engine.load_with_options("wf", "dc1", &f, &bad, None).unwrap_err().code_str(), "configuration_error");
}

#[test]
fn gap_policies() {
    let f = vec![FilterDescriptor::select("dc4", "other", vec![1i64])];

    let (strict, _) = engine();
    let err = strict.load("wf", "dc1", &f, None).unwrap_err();
    assert_eq!(err.code_str(), "configuration_error");
    assert!(err.to_string().contains("dc1--dc4"));

    let cfg = EngineConfig { gap_fill: GapFillPolicy::Ignore, ..EngineConfig::default() };
    let (lenient, _) = engine_with(cfg, Arc::new(catalog()));
    let df = lenient.load("wf", "dc1", &f, None).unwrap();
    assert_eq!(df.height(), 3);
}

#[test]
fn reused_declaration_bridges_unjoined_table() {
    // dc5 has no declared join; the first known declaration (dc1--dc2, inner on sample) stands in
    let cfg = EngineConfig { gap_fill: GapFillPolicy::ReuseKnownDeclaration, ..EngineConfig::default() };
    let (engine, storage) = engine_with(cfg, Arc::new(catalog()));
    let f = vec![FilterDescriptor::select("dc5", "batch", vec!["b1"])];
    let df = engine.load("wf", "dc1", &f, None).unwrap();
    assert_eq!(df.height(), 1);
    assert_eq!(df.column("batch").unwrap().str().unwrap().get(0), Some("b1"));
    assert_eq!(df.column("sample").unwrap().str().unwrap().get(0), Some("s1"));
    assert_eq!(storage.scan_count(), 2);

    let groups = engine.resolve_join_groups("wf", &["dc1".to_string(), "dc5".to_string()], None).unwrap();
    assert_eq!(groups.len(), 2);
}

#[test]
fn catalog_outage_degrades_to_target_alone() {
    let (engine, _) = engine_with(EngineConfig::default(), Arc::new(DownCatalog));
    let f = vec![FilterDescriptor::select("dc1", "site", vec!["B"]), FilterDescriptor::select("dc2", "run", vec!["r1"])];
    let df = engine.load("wf", "dc1", &f, None).unwrap();
    assert_eq!(df.height(), 1);
    assert!(engine.caches().results.is_empty());
    assert!(engine.caches().catalogs.is_empty());

    let groups = engine.resolve_join_groups("wf", &["dc1".to_string(), "dc2".to_string()], None).unwrap();
    assert_eq!(groups.len(), 2);

    let (broken, _) = engine_with(EngineConfig::default(), Arc::new(BrokenCatalog));
    assert_eq!(broken.load("wf", "dc1", &f, None).unwrap_err().code_str(), "invariant_violation");
}

#[test]
fn inert_filters_do_not_pull_in_joins() {
    let (engine, storage) = engine();
    let f = vec![FilterDescriptor::select("dc4", "other", Vec::<i64>::new())];
    let df = engine.load("wf", "dc1", &f, None).unwrap();
    assert_eq!(df.height(), 3);
    assert_eq!(storage.scan_count(), 1);
}

#[test]
fn lookup_failures_on_load_propagate() {
    struct Nowhere;
    impl MetadataLookup for Nowhere {
        fn locate(&self, workflow_id: &str, dc: &str, _token: Option<&str>) -> EngineResult<DataCollectionLocation> {
            Err(EngineError::lookup(workflow_id, dc, "not found"))
        }
    }
    let engine = DataEngine::new(EngineConfig::default(), Arc::new(Nowhere), Arc::new(catalog()), storage());
    assert!(engine.load("wf", "dc1", &[], None).unwrap_err().is_lookup());
}
