//! Introspection fallback chains and target table recreation.

mod common;

use std::sync::Arc;

use common::{FakeSource, FakeTarget, SourceTable};
use mssql_mariadb_migrate::{
    ColumnStrategy, Introspector, KeyStrategy, MigrateError, SqlValue, StructureSynchronizer,
    TableDefinition,
};

fn owner_source() -> Arc<FakeSource> {
    Arc::new(FakeSource::new().with_id_name_table("Owner", 3))
}

// =============================================================================
// Introspection
// =============================================================================

#[tokio::test]
async fn test_information_schema_is_tried_first() {
    let source = owner_source();
    let table = Introspector::new(source.clone())
        .describe("dbo", "Owner")
        .await
        .unwrap();

    assert_eq!(table.columns.len(), 2);
    assert_eq!(table.primary_key, vec!["id"]);
    assert_eq!(
        *source.column_lookups.lock().unwrap(),
        vec![ColumnStrategy::InformationSchema]
    );
}

#[tokio::test]
async fn test_column_chain_falls_back_to_system_catalog() {
    let source = owner_source();
    source
        .failing_columns
        .lock()
        .unwrap()
        .push(ColumnStrategy::InformationSchema);

    let table = Introspector::new(source.clone())
        .describe("dbo", "Owner")
        .await
        .unwrap();

    assert_eq!(table.columns.len(), 2);
    assert_eq!(
        *source.column_lookups.lock().unwrap(),
        vec![ColumnStrategy::SystemCatalog]
    );
}

#[tokio::test]
async fn test_empty_answer_moves_to_next_strategy() {
    let source = owner_source();
    source
        .failing_columns
        .lock()
        .unwrap()
        .push(ColumnStrategy::InformationSchema);
    source
        .empty_columns
        .lock()
        .unwrap()
        .push(ColumnStrategy::SystemCatalog);

    let table = Introspector::new(source.clone())
        .describe("dbo", "Owner")
        .await
        .unwrap();

    assert_eq!(table.columns.len(), 2);
    assert_eq!(
        *source.column_lookups.lock().unwrap(),
        vec![ColumnStrategy::ProbeQuery]
    );
}

#[tokio::test]
async fn test_no_strategy_means_no_schema() {
    let source = owner_source();
    source
        .failing_columns
        .lock()
        .unwrap()
        .extend(ColumnStrategy::CHAIN);

    assert!(Introspector::new(source).describe("dbo", "Owner").await.is_none());
}

#[tokio::test]
async fn test_missing_table_is_not_described() {
    let source = owner_source();
    assert!(Introspector::new(source).describe("dbo", "Ghost").await.is_none());
}

#[tokio::test]
async fn test_custom_column_chain() {
    let source = owner_source();
    let table = Introspector::new(source.clone())
        .with_column_chain(vec![ColumnStrategy::ProbeQuery])
        .describe("dbo", "Owner")
        .await
        .unwrap();

    assert_eq!(table.columns.len(), 2);
    assert_eq!(
        *source.column_lookups.lock().unwrap(),
        vec![ColumnStrategy::ProbeQuery]
    );
}

#[tokio::test]
async fn test_key_chain_falls_back() {
    let source = owner_source();
    source
        .failing_keys
        .lock()
        .unwrap()
        .push(KeyStrategy::KeyColumnUsage);

    let introspector = Introspector::new(source.clone());
    assert_eq!(introspector.primary_key("dbo", "Owner").await, vec!["id"]);

    source
        .failing_keys
        .lock()
        .unwrap()
        .push(KeyStrategy::SystemCatalog);
    assert!(introspector.primary_key("dbo", "Owner").await.is_empty());

    // A table without a discoverable key is still described.
    let table = introspector.describe("dbo", "Owner").await.unwrap();
    assert!(table.primary_key.is_empty());
}

#[tokio::test]
async fn test_key_columns_missing_from_column_list_are_dropped() {
    let source = Arc::new(FakeSource::new().with_table(
        "Owner",
        SourceTable {
            columns: vec![common::int_column("id"), common::text_column("name", 50)],
            primary_key: vec!["id".to_string(), "ghost".to_string()],
            foreign_keys: Vec::new(),
            rows: Vec::new(),
        },
    ));

    let table = Introspector::new(source).describe("dbo", "Owner").await.unwrap();
    assert_eq!(table.primary_key, vec!["id"]);
}

// =============================================================================
// Structure synchronization
// =============================================================================

#[tokio::test]
async fn test_synchronize_is_repeatable() {
    let source = owner_source();
    let table = source.describe("Owner");
    let target = FakeTarget::new();
    let synchronizer = StructureSynchronizer::new(Arc::new(target.clone()));

    let first = synchronizer.synchronize(&table).await.unwrap();
    let second = synchronizer.synchronize(&table).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        target.calls(),
        vec!["drop:Owner", "create:Owner", "drop:Owner", "create:Owner"]
    );
    assert!(target.has_table("Owner"));
}

#[tokio::test]
async fn test_synchronize_discards_previous_contents() {
    let source = owner_source();
    let table = source.describe("Owner");
    let target = FakeTarget::new();
    target.seed(
        TableDefinition::from_table(&table),
        vec![vec![SqlValue::Integer(99), SqlValue::Text("stale".into())]],
    );

    StructureSynchronizer::new(Arc::new(target.clone()))
        .synchronize(&table)
        .await
        .unwrap();

    assert!(target.rows("Owner").is_empty());
}

#[tokio::test]
async fn test_column_count_mismatch_fails_structure() {
    let source = owner_source();
    let target = FakeTarget::new();
    target.state.lock().unwrap().column_count_skew = 1;

    let err = StructureSynchronizer::new(Arc::new(target))
        .synchronize(&source.describe("Owner"))
        .await
        .unwrap_err();

    match err {
        MigrateError::Structure { table, message } => {
            assert_eq!(table, "Owner");
            assert!(message.contains("expected 2 columns"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_create_failure_is_reported() {
    let source = owner_source();
    let target = FakeTarget::new();
    target.state.lock().unwrap().fail_create.push("Owner".to_string());

    let result = StructureSynchronizer::new(Arc::new(target.clone()))
        .synchronize(&source.describe("Owner"))
        .await;

    assert!(matches!(result, Err(MigrateError::Structure { .. })));
    assert!(!target.has_table("Owner"));
}

#[tokio::test]
async fn test_text_primary_key_gets_prefix() {
    let source = Arc::new(FakeSource::new().with_table(
        "Document",
        SourceTable {
            columns: vec![
                common::text_column("code", -1),
                common::text_column("title", 200),
            ],
            primary_key: vec!["code".to_string()],
            foreign_keys: Vec::new(),
            rows: Vec::new(),
        },
    ));

    let definition = TableDefinition::from_table(&source.describe("Document"));
    let ddl = definition.create_statement().unwrap();

    assert!(ddl.contains("`code` TEXT NULL"));
    assert!(ddl.contains("`title` VARCHAR(200) NULL"));
    assert!(ddl.contains("PRIMARY KEY (`code`(255))"));
}
