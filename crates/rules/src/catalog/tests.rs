use std::fs;

use super::*;

#[test]
fn embedded_pack_is_valid_and_listed() {
    let catalog = RulePackCatalog::embedded().unwrap();
    let packs = catalog.list();
    assert_eq!(packs.len(), 1);
    let pack = &packs[0];
    assert_eq!(pack.slug, DEFAULT_PACK_SLUG);
    assert_eq!(pack.name, "Pacote ZFM");
    assert_eq!(pack.version.as_deref(), Some("2024.04"));
    assert!(pack.description.as_deref().unwrap().contains("Zona Franca"));
    assert_eq!(pack.source_text, DEFAULT_PACK_SOURCE);
}

#[test]
fn scans_directory_and_reports_each_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("uf_checks.yaml"),
        "name: UF\nrules:\n  - id: uf\n    name: uf\n    then: {inconsistency_code: UF, severity: low, message: m}\n",
    )
    .unwrap();
    fs::write(dir.path().join("broken.yml"), "rules:\n  - id: x\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "hello").unwrap();
    fs::write(dir.path().join(".hidden.yaml"), "rules: []").unwrap();

    let catalog = RulePackCatalog::new(Some(dir.path().to_path_buf()));
    let results = catalog.reload().unwrap();

    let loaded = results.iter().filter(|r| matches!(r.status, LoadStatus::Loaded { .. })).count();
    let failed = results.iter().filter(|r| matches!(r.status, LoadStatus::Failed { .. })).count();
    let skipped = results.iter().filter(|r| matches!(r.status, LoadStatus::Skipped { .. })).count();
    assert_eq!((loaded, failed, skipped), (1, 1, 2));

    let slugs: Vec<_> = catalog.list().into_iter().map(|p| p.slug).collect();
    assert_eq!(slugs, vec!["uf_checks", DEFAULT_PACK_SLUG]);
    assert_eq!(catalog.get("uf_checks").unwrap().name, "UF");
    assert!(matches!(catalog.get("nope"), Err(CatalogError::NotFound(_))));
}

#[test]
fn directory_pack_replaces_embedded_slug() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("zfm_baseline.yaml"), "name: Local ZFM\nrules: []\n").unwrap();

    let catalog = RulePackCatalog::new(Some(dir.path().to_path_buf()));
    catalog.reload().unwrap();
    let packs = catalog.list();
    assert_eq!(packs.len(), 1);
    assert_eq!(packs[0].name, "Local ZFM");
}

#[test]
fn missing_directory_falls_back_to_embedded() {
    let catalog = RulePackCatalog::new(Some("/definitely/not/here".into()));
    assert!(catalog.reload().unwrap().is_empty());
    assert_eq!(catalog.list().len(), 1);
}
