//! Integration tests against a running MongoDB server.
//!
//! These tests require a MongoDB server to be running.
//! Set MONGODB_URI environment variable to customize connection.
//! Default: mongodb://localhost:27017/docmap-integration-test
//!
//! Run with: cargo test -p docmap-mongodb --test test_integration -- --ignored

use docmap_mongodb::{
    create_schema, Arg, ConnectConfig, ConnectionManager, FieldDef, ReadyState, SchemaDefinition,
    SchemaOptions, SCHEMA_OPTIONS,
};

/// Helper to get a database URL unique to one test
fn get_database_url(suffix: &str) -> String {
    let base = std::env::var("MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017/docmap-integration-test".to_string());
    let (prefix, _) = base.rsplit_once('/').unwrap_or((base.as_str(), ""));
    format!("{}/docmap-it-{}", prefix, suffix)
}

fn manager() -> ConnectionManager {
    ConnectionManager::mongo(ConnectConfig::default())
}

#[tokio::test]
#[ignore] // Only run with --ignored flag when database is available
async fn test_connect_sync_clear_drop() {
    let manager = manager();
    let schema = create_schema(
        SchemaDefinition::new().field("name", FieldDef::string().index()),
        Some(SchemaOptions {
            auto_index: false,
            ..SCHEMA_OPTIONS
        }),
        &[],
    );
    let model = manager
        .model(vec![Arg::from("TestModel"), Arg::from(schema)])
        .unwrap();

    let connection = manager
        .connect(Some(&get_database_url("lifecycle")))
        .await
        .unwrap();
    assert_eq!(connection.ready_state(), ReadyState::Connected);

    model.create_collection().await.unwrap();
    manager.sync_indexes(None).await.unwrap();
    assert_eq!(model.list_indexes().await.unwrap(), vec!["_id_", "name_1"]);

    manager.clear(Vec::<Arg>::new()).await.unwrap();
    manager.drop_database(None).await.unwrap();
    assert_eq!(connection.ready_state(), ReadyState::Disconnected);
}

#[tokio::test]
#[ignore]
async fn test_sync_rebuilds_conflicting_index() {
    let manager = manager();
    let plain = create_schema(
        SchemaDefinition::new().field("email", FieldDef::string().index()),
        None,
        &[],
    );
    let url = get_database_url("conflict");
    let first = manager.model(vec![Arg::from("Account"), Arg::from(plain)]).unwrap();
    manager.connect(Some(&url)).await.unwrap();
    assert_eq!(first.list_indexes().await.unwrap(), vec!["_id_", "email_1"]);

    // Re-register with a unique index under the same name
    manager.delete_models(vec![Arg::from("Account")]);
    let unique = create_schema(
        SchemaDefinition::new().field("email", FieldDef::string().unique()),
        Some(SchemaOptions {
            auto_index: false,
            ..SCHEMA_OPTIONS
        }),
        &[],
    );
    let second = manager.model(vec![Arg::from("Account"), Arg::from(unique)]).unwrap();
    manager.sync_indexes(None).await.unwrap();
    assert_eq!(second.list_indexes().await.unwrap(), vec!["_id_", "email_1"]);

    manager.drop_database(None).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_separate_connections() {
    let manager = manager();
    let default = manager.connect(Some(&get_database_url("one"))).await.unwrap();
    let other = manager.connect_new(Some(&get_database_url("two"))).await.unwrap();
    assert_ne!(default, other);
    assert_eq!(other.name().as_deref(), Some("docmap-it-two"));

    manager.drop_database(Some(&other)).await.unwrap();
    manager.drop_database(None).await.unwrap();
    manager.disconnect(None).await.unwrap();
}
