//! In-memory backend
//!
//! [`MemoryConnector`] opens backends onto a shared [`MemoryServer`] that
//! keeps databases, collections and indexes in process. It records every
//! call and can be told to fail the next matching operation, which is what
//! the unit and in-memory integration tests drive the crate with.
//!
//! # Example
//! ```rust,ignore
//! use docmap_mongodb::memory::{MemoryConnector, Operation};
//! use docmap_mongodb::{ConnectConfig, ConnectionManager};
//!
//! let connector = MemoryConnector::new();
//! let manager = ConnectionManager::new(ConnectConfig::default(), connector.clone().into());
//! manager.connect(Some("mongodb://localhost/app")).await?;
//! assert_eq!(connector.server().count(Operation::Open), 1);
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bson::Document;
use docmap_common::DocmapError;
use parking_lot::Mutex;

use crate::backend::{trace_command, Backend, Connector, ID_INDEX};
use crate::config::PoolConfig;
use crate::schema::IndexSpec;
use crate::uri::ParsedUri;
use crate::Result;

/// Operations the memory server records and can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Open,
    Ping,
    DeleteMany,
    CreateCollection,
    ListIndexes,
    SyncIndexes,
    DropIndexes,
    CreateIndexes,
    DropDatabase,
    Close,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub database: String,
    pub collection: Option<String>,
}

struct Failure {
    operation: Operation,
    collection: Option<String>,
    error: DocmapError,
}

#[derive(Default)]
struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

type Databases = BTreeMap<String, BTreeMap<String, CollectionState>>;

/// Shared state behind every backend a [`MemoryConnector`] opens
#[derive(Default)]
pub struct MemoryServer {
    databases: Mutex<Databases>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<Vec<Failure>>,
    uris: Mutex<Vec<String>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `operation`, optionally only on `collection`, with `error`
    pub fn fail_next(&self, operation: Operation, collection: Option<&str>, error: DocmapError) {
        self.failures.lock().push(Failure {
            operation,
            collection: collection.map(str::to_string),
            error,
        });
    }

    /// Seed `collection` with documents, creating it if needed
    pub fn insert(&self, database: &str, collection: &str, documents: impl IntoIterator<Item = Document>) {
        self.databases
            .lock()
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .documents
            .extend(documents);
    }

    /// Documents stored in `collection`; zero if it does not exist
    pub fn document_count(&self, database: &str, collection: &str) -> usize {
        self.databases
            .lock()
            .get(database)
            .and_then(|collections| collections.get(collection))
            .map_or(0, |c| c.documents.len())
    }

    pub fn has_database(&self, database: &str) -> bool {
        self.databases.lock().contains_key(database)
    }

    pub fn has_collection(&self, database: &str, collection: &str) -> bool {
        self.databases
            .lock()
            .get(database)
            .is_some_and(|collections| collections.contains_key(collection))
    }

    /// Index names on `collection`, `_id_` first; empty if it does not exist
    pub fn index_names(&self, database: &str, collection: &str) -> Vec<String> {
        let databases = self.databases.lock();
        let Some(state) = databases.get(database).and_then(|c| c.get(collection)) else {
            return Vec::new();
        };
        std::iter::once(ID_INDEX.to_string())
            .chain(state.indexes.iter().map(|spec| spec.name.clone()))
            .collect()
    }

    /// Index definition named `name` on `collection`
    pub fn index(&self, database: &str, collection: &str, name: &str) -> Option<IndexSpec> {
        self.databases
            .lock()
            .get(database)
            .and_then(|c| c.get(collection))
            .and_then(|state| state.indexes.iter().find(|spec| spec.name == name).cloned())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls of `operation`
    pub fn count(&self, operation: Operation) -> usize {
        self.calls.lock().iter().filter(|c| c.operation == operation).count()
    }

    /// Connection strings opened so far, in order
    pub fn opened_uris(&self) -> Vec<String> {
        self.uris.lock().clone()
    }

    fn record(&self, operation: Operation, database: &str, collection: Option<&str>) -> Result<()> {
        self.calls.lock().push(Call {
            operation,
            database: database.to_string(),
            collection: collection.map(str::to_string),
        });

        let mut failures = self.failures.lock();
        let position = failures.iter().position(|f| {
            f.operation == operation
                && match (&f.collection, collection) {
                    (None, _) => true,
                    (Some(wanted), Some(actual)) => wanted == actual,
                    (Some(_), None) => false,
                }
        });
        match position {
            Some(index) => Err(failures.remove(index).error),
            None => Ok(()),
        }
    }
}

/// Connector onto a [`MemoryServer`]
#[derive(Clone, Default)]
pub struct MemoryConnector {
    server: Arc<MemoryServer>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(server: Arc<MemoryServer>) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &Arc<MemoryServer> {
        &self.server
    }
}

impl From<MemoryConnector> for Arc<dyn Connector> {
    fn from(connector: MemoryConnector) -> Self {
        Arc::new(connector)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, uri: &str, _pool: &PoolConfig) -> Result<Arc<dyn Backend>> {
        let parsed: ParsedUri = uri.parse()?;
        self.server.record(Operation::Open, &parsed.database, None)?;
        self.server.uris.lock().push(uri.to_string());
        Ok(Arc::new(MemoryBackend {
            server: Arc::clone(&self.server),
            database: parsed.database,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Backend onto one database of a [`MemoryServer`]
pub struct MemoryBackend {
    server: Arc<MemoryServer>,
    database: String,
    closed: AtomicBool,
}

impl MemoryBackend {
    fn begin(&self, operation: Operation, collection: Option<&str>, command: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DocmapError::Connection(format!(
                "connection to '{}' is closed",
                self.database
            )));
        }
        trace_command(&self.database, collection.unwrap_or("$cmd"), command);
        self.server.record(operation, &self.database, collection)
    }

    fn with_collections<T>(&self, f: impl FnOnce(&mut BTreeMap<String, CollectionState>) -> T) -> T {
        let mut databases = self.server.databases.lock();
        f(databases.entry(self.database.clone()).or_default())
    }
}

/// Existing index that `spec` cannot coexist with
fn conflict<'a>(existing: &'a [IndexSpec], spec: &IndexSpec) -> Option<&'a IndexSpec> {
    existing.iter().find(|current| {
        (current.name == spec.name && *current != spec)
            || (current.keys == spec.keys && current.name != spec.name)
    })
}

fn conflict_error(collection: &str, existing: &IndexSpec, spec: &IndexSpec) -> DocmapError {
    DocmapError::NamespaceExists(format!(
        "index '{}' on '{}' conflicts with existing index '{}'",
        spec.name, collection, existing.name
    ))
}

#[async_trait]
impl Backend for MemoryBackend {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn ping(&self) -> Result<()> {
        self.begin(Operation::Ping, None, "ping")
    }

    async fn delete_many(&self, collection: &str) -> Result<u64> {
        self.begin(Operation::DeleteMany, Some(collection), "deleteMany")?;
        let mut databases = self.server.databases.lock();
        let deleted = databases
            .get_mut(&self.database)
            .and_then(|collections| collections.get_mut(collection))
            .map_or(0, |state| std::mem::take(&mut state.documents).len());
        Ok(deleted as u64)
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        self.begin(Operation::CreateCollection, Some(collection), "createCollection")?;
        self.with_collections(|collections| {
            if collections.contains_key(collection) {
                return Err(DocmapError::NamespaceExists(format!(
                    "collection {}.{} already exists",
                    self.database, collection
                )));
            }
            collections.insert(collection.to_string(), CollectionState::default());
            Ok(())
        })
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>> {
        self.begin(Operation::ListIndexes, Some(collection), "listIndexes")?;
        Ok(self.server.index_names(&self.database, collection))
    }

    async fn sync_indexes(&self, collection: &str, indexes: &[IndexSpec]) -> Result<()> {
        self.begin(Operation::SyncIndexes, Some(collection), "syncIndexes")?;
        self.with_collections(|collections| {
            let state = collections.entry(collection.to_string()).or_default();
            let declared: Vec<&str> = indexes.iter().map(|spec| spec.name.as_str()).collect();
            state.indexes.retain(|current| declared.contains(&current.name.as_str()));

            for spec in indexes {
                if let Some(existing) = conflict(&state.indexes, spec) {
                    return Err(conflict_error(collection, existing, spec));
                }
                if !state.indexes.contains(spec) {
                    state.indexes.push(spec.clone());
                }
            }
            Ok(())
        })
    }

    async fn drop_indexes(&self, collection: &str) -> Result<()> {
        self.begin(Operation::DropIndexes, Some(collection), "dropIndexes")?;
        self.with_collections(|collections| {
            if let Some(state) = collections.get_mut(collection) {
                state.indexes.clear();
            }
        });
        Ok(())
    }

    async fn create_indexes(&self, collection: &str, indexes: &[IndexSpec]) -> Result<()> {
        self.begin(Operation::CreateIndexes, Some(collection), "createIndexes")?;
        self.with_collections(|collections| {
            let state = collections.entry(collection.to_string()).or_default();
            for spec in indexes {
                if let Some(existing) = conflict(&state.indexes, spec) {
                    return Err(conflict_error(collection, existing, spec));
                }
            }
            for spec in indexes {
                if !state.indexes.contains(spec) {
                    state.indexes.push(spec.clone());
                }
            }
            Ok(())
        })
    }

    async fn drop_database(&self) -> Result<()> {
        self.begin(Operation::DropDatabase, None, "dropDatabase")?;
        self.server.databases.lock().remove(&self.database);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.begin(Operation::Close, None, "close")?;
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    async fn open(connector: &MemoryConnector) -> Arc<dyn Backend> {
        connector
            .open("mongodb://localhost/memory", &PoolConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_delete_many() {
        let connector = MemoryConnector::new();
        let backend = open(&connector).await;
        connector
            .server()
            .insert("memory", "users", vec![doc! {"name": "a"}, doc! {"name": "b"}]);

        assert_eq!(backend.delete_many("users").await.unwrap(), 2);
        assert_eq!(connector.server().document_count("memory", "users"), 0);
        assert_eq!(backend.delete_many("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_collection_twice() {
        let connector = MemoryConnector::new();
        let backend = open(&connector).await;
        backend.create_collection("users").await.unwrap();
        let err = backend.create_collection("users").await.unwrap_err();
        assert!(err.is_namespace_exists());
    }

    #[tokio::test]
    async fn test_sync_indexes() {
        let connector = MemoryConnector::new();
        let backend = open(&connector).await;
        let name = IndexSpec::single("name");
        let email = IndexSpec::single("email").unique(true);

        backend.sync_indexes("users", &[name.clone(), email.clone()]).await.unwrap();
        assert_eq!(
            backend.list_indexes("users").await.unwrap(),
            vec!["_id_", "name_1", "email_1"]
        );

        backend.sync_indexes("users", &[email]).await.unwrap();
        assert_eq!(backend.list_indexes("users").await.unwrap(), vec!["_id_", "email_1"]);
    }

    #[tokio::test]
    async fn test_create_conflicting_index() {
        let connector = MemoryConnector::new();
        let backend = open(&connector).await;
        backend
            .create_indexes("users", &[IndexSpec::single("email")])
            .await
            .unwrap();
        let err = backend
            .create_indexes("users", &[IndexSpec::single("email").unique(true)])
            .await
            .unwrap_err();
        assert!(err.is_namespace_exists());

        backend.drop_indexes("users").await.unwrap();
        assert_eq!(backend.list_indexes("users").await.unwrap(), vec!["_id_"]);
    }

    #[tokio::test]
    async fn test_list_indexes_missing_collection() {
        let connector = MemoryConnector::new();
        let backend = open(&connector).await;
        assert!(backend.list_indexes("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_database() {
        let connector = MemoryConnector::new();
        let backend = open(&connector).await;
        backend.create_collection("users").await.unwrap();
        assert!(connector.server().has_database("memory"));
        backend.drop_database().await.unwrap();
        assert!(!connector.server().has_database("memory"));
    }

    #[tokio::test]
    async fn test_fail_next_matches_collection() {
        let connector = MemoryConnector::new();
        let backend = open(&connector).await;
        connector.server().fail_next(
            Operation::DeleteMany,
            Some("posts"),
            DocmapError::MongoDB("boom".to_string()),
        );

        backend.delete_many("users").await.unwrap();
        assert!(backend.delete_many("posts").await.is_err());
        // One-shot
        backend.delete_many("posts").await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_backend_rejects_calls() {
        let connector = MemoryConnector::new();
        let backend = open(&connector).await;
        backend.close().await.unwrap();
        let err = backend.ping().await.unwrap_err();
        assert!(matches!(err, DocmapError::Connection(_)));
    }

    #[tokio::test]
    async fn test_calls_are_recorded() {
        let connector = MemoryConnector::new();
        let backend = open(&connector).await;
        backend.ping().await.unwrap();
        let calls = connector.server().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].operation, Operation::Open);
        assert_eq!(calls[1].operation, Operation::Ping);
        assert_eq!(calls[1].database, "memory");
        assert_eq!(connector.server().opened_uris(), vec!["mongodb://localhost/memory"]);
    }
}
