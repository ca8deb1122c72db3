use super::*;
use crate::catalog::StaticCatalog;
use crate::config::EngineConfig;
use crate::filters::FilterDescriptor;
use crate::model::DataCollection;
use crate::storage::MemoryStorage;

fn dc(id: &str, location: &str) -> DataCollection {
    DataCollection { id: id.into(), location: location.into(), size_bytes: Some(2048), columns: Default::default() }
}

fn samples() -> DataFrame {
    df!(
        "sample" => ["s1", "s2", "s3", "s4"],
        "depth" => [10i64, 25, 40, 55],
        "aggregation_time" => [1i64, 1, 1, 1]
    )
    .unwrap()
}

fn setup() -> (Arc<StaticCatalog>, Arc<MemoryStorage>, TableLoader) {
    let catalog = Arc::new(
        StaticCatalog::default()
            .with_data_collection("wf", dc("dc1", "mem://dc1"))
            .with_data_collection("wf", dc("empty", "  "))
            .with_data_collection("wf", dc("gone", "mem://gone")),
    );
    let storage = Arc::new(MemoryStorage::new().with_table("mem://dc1", samples()));
    let loader = TableLoader::new(catalog.clone(), storage.clone(), vec!["aggregation_time".to_string()]);
    (catalog, storage, loader)
}

fn req<'a>(dc: &'a str, filters: &'a [FilterDescriptor], options: &'a LoadOptions) -> TableRequest<'a> {
    TableRequest { workflow_id: "wf", data_collection_id: dc, filters, options, token: None }
}

#[test]
fn filters_are_pushed_and_internal_columns_dropped() {
    let (_, _, loader) = setup();
    let filters = vec![
        FilterDescriptor::range("dc1", "depth", 20i64, 50i64),
        // aimed at another table, ignored here
        FilterDescriptor::select("dc9", "depth", vec![10i64]),
    ];
    let opts = LoadOptions::default();
    let df = loader.load(&req("dc1", &filters, &opts)).unwrap();
    assert_eq!(df.height(), 2);
    assert!(df.column("aggregation_time").is_err());
    let samples: Vec<Option<&str>> = df.column("sample").unwrap().str().unwrap().into_iter().collect();
    assert_eq!(samples, vec![Some("s2"), Some("s3")]);
}

#[test]
fn projection_and_limit() {
    let (_, _, loader) = setup();
    let opts = LoadOptions { select_columns: Some(vec!["sample".into()]), limit_rows: Some(3) };
    let df = loader.load(&req("dc1", &[], &opts)).unwrap();
    assert_eq!(df.shape(), (3, 1));
}

#[test]
fn error_kinds() {
    let (_, _, loader) = setup();
    let opts = LoadOptions::default();

    let err = loader.load(&req("empty", &[], &opts)).unwrap_err();
    assert_eq!(err.code_str(), "configuration_error");
    assert!(err.to_string().contains("no storage location"));

    assert!(loader.load(&req("dc404", &[], &opts)).unwrap_err().is_lookup());
    assert_eq!(loader.load(&req("gone", &[], &opts)).unwrap_err().code_str(), "storage_error");

    let bad = vec![FilterDescriptor::select("dc1", "nope", vec!["x"])];
    let err = loader.load(&req("dc1", &bad, &opts)).unwrap_err();
    assert_eq!(err.code_str(), "configuration_error");
    assert!(err.to_string().contains("nope"));
}

#[test]
fn cached_loader_hits_on_same_signature() {
    let (_, storage, loader) = setup();
    let caches = Arc::new(EngineCaches::new(&EngineConfig::default()));
    let cached = CachedTableLoader::new(Arc::new(loader), caches.clone());
    let opts = LoadOptions::default();
    let f = vec![FilterDescriptor::select("dc1", "sample", vec!["s1", "s2"])];

    let a = cached.load_table(&req("dc1", &f, &opts)).unwrap();
    let b = cached.load_table(&req("dc1", &f, &opts)).unwrap();
    assert!(a.equals(&b));
    assert_eq!(storage.scan_count(), 1);

    // inert filters do not change the signature
    let inert = vec![FilterDescriptor::select("dc1", "sample", Vec::<&str>::new())];
    let none = cached.load_table(&req("dc1", &inert, &opts)).unwrap();
    let again = cached.load_table(&req("dc1", &[], &opts)).unwrap();
    assert_eq!(none.height(), 4);
    assert!(none.equals(&again));
    assert_eq!(storage.scan_count(), 2);

    let limited = LoadOptions { select_columns: None, limit_rows: Some(1) };
    assert_eq!(cached.load_table(&req("dc1", &[], &limited)).unwrap().height(), 1);
    assert_eq!(storage.scan_count(), 3);
    assert_eq!(caches.tables.len(), 3);
}

#[test]
fn oversized_limit_keeps_every_row() {
    let (_, _, loader) = setup();
    let opts = LoadOptions { select_columns: None, limit_rows: Some(usize::MAX) };
    assert_eq!(loader.load(&req("dc1", &[], &opts)).unwrap().height(), 4);
    let opts = LoadOptions { select_columns: None, limit_rows: Some((u32::MAX as usize).saturating_add(1)) };
    assert_eq!(loader.load(&req("dc1", &[], &opts)).unwrap().height(), 4);
}
