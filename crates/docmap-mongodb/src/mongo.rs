//! Driver-backed backend with pool configuration and health checking

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Document};
use docmap_common::DocmapError;
use futures::TryStreamExt;
use mongodb::{
    error::ErrorKind,
    options::{ClientOptions, IndexOptions, ServerApi, ServerApiVersion},
    Client, Collection, Database, IndexModel,
};
use tracing::debug;

use crate::backend::{trace_command, Backend, Connector, ID_INDEX};
use crate::config::PoolConfig;
use crate::schema::IndexSpec;
use crate::uri::DEFAULT_PARSE_DATABASE;
use crate::Result;

/// Server error code for an operation on a missing collection
const NAMESPACE_NOT_FOUND: i32 = 26;

/// Opens [`MongoBackend`]s through the official driver
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoConnector;

impl From<MongoConnector> for Arc<dyn Connector> {
    fn from(connector: MongoConnector) -> Self {
        Arc::new(connector)
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn open(&self, uri: &str, pool: &PoolConfig) -> Result<Arc<dyn Backend>> {
        let backend = MongoBackend::with_config(uri, pool.clone()).await?;
        backend.ping().await?;
        Ok(Arc::new(backend))
    }
}

/// MongoDB connection with pooling support
pub struct MongoBackend {
    client: Client,
    database: Database,
    database_name: String,
}

impl MongoBackend {
    /// Create a new MongoDB connection with default pool settings
    pub async fn new(connection_string: &str) -> Result<Self> {
        Self::with_config(connection_string, PoolConfig::default()).await
    }

    /// Create a new MongoDB connection with custom pool configuration
    ///
    /// Connection strings without a database use `test`.
    pub async fn with_config(connection_string: &str, config: PoolConfig) -> Result<Self> {
        let mut client_options = ClientOptions::parse(connection_string).await?;

        // Apply pool configuration
        if let Some(min) = config.min_pool_size {
            client_options.min_pool_size = Some(min);
        }
        if let Some(max) = config.max_pool_size {
            client_options.max_pool_size = Some(max);
        }
        if let Some(idle) = config.max_idle_time {
            client_options.max_idle_time = Some(idle);
        }
        if let Some(connect) = config.connect_timeout {
            client_options.connect_timeout = Some(connect);
        }
        if let Some(server_sel) = config.server_selection_timeout {
            client_options.server_selection_timeout = Some(server_sel);
        }
        if let Some(app) = config.app_name {
            client_options.app_name = Some(app);
        }

        // Set stable API version for compatibility
        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        let client = Client::with_options(client_options)?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_PARSE_DATABASE));
        let database_name = database.name().to_string();

        Ok(Self {
            client,
            database,
            database_name,
        })
    }

    /// Get a reference to the database
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Get a reference to the client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    async fn existing_indexes(&self, collection: &str) -> Result<Vec<IndexModel>> {
        trace_command(&self.database_name, collection, "listIndexes");
        match self.collection(collection).list_indexes().await {
            Ok(cursor) => Ok(cursor.try_collect().await?),
            Err(e) if is_namespace_not_found(&e) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

fn index_name(model: &IndexModel) -> Option<&str> {
    model.options.as_ref().and_then(|o| o.name.as_deref())
}

/// True if the server-side index is exactly the declared one
fn matches_spec(model: &IndexModel, spec: &IndexSpec) -> bool {
    let options = model.options.as_ref();
    index_name(model) == Some(spec.name.as_str())
        && model.keys == index_model(spec).keys
        && options.and_then(|o| o.unique).unwrap_or(false) == spec.unique
        && options.and_then(|o| o.sparse).unwrap_or(false) == spec.sparse
}

fn is_namespace_not_found(err: &mongodb::error::Error) -> bool {
    matches!(err.kind.as_ref(), ErrorKind::Command(cmd) if cmd.code == NAMESPACE_NOT_FOUND)
}

fn index_model(spec: &IndexSpec) -> IndexModel {
    let mut keys = Document::new();
    for (path, direction) in &spec.keys {
        keys.insert(path.clone(), *direction);
    }
    let options = IndexOptions::builder()
        .name(spec.name.clone())
        .unique(spec.unique)
        .sparse(spec.sparse)
        .build();
    IndexModel::builder().keys(keys).options(options).build()
}

#[async_trait]
impl Backend for MongoBackend {
    fn database_name(&self) -> &str {
        &self.database_name
    }

    async fn ping(&self) -> Result<()> {
        trace_command(&self.database_name, "$cmd", "ping");
        match self.database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => Ok(()),
            Err(e) => Err(DocmapError::Connection(format!("Ping failed: {}", e))),
        }
    }

    async fn delete_many(&self, collection: &str) -> Result<u64> {
        trace_command(&self.database_name, collection, "deleteMany");
        let result = self.collection(collection).delete_many(doc! {}).await?;
        Ok(result.deleted_count)
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        trace_command(&self.database_name, collection, "createCollection");
        self.database.create_collection(collection).await?;
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>> {
        trace_command(&self.database_name, collection, "listIndexes");
        match self.collection(collection).list_index_names().await {
            Ok(names) => Ok(names),
            Err(e) if is_namespace_not_found(&e) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn sync_indexes(&self, collection: &str, indexes: &[IndexSpec]) -> Result<()> {
        let existing = self.existing_indexes(collection).await?;
        let declared: HashSet<&str> = indexes.iter().map(|spec| spec.name.as_str()).collect();
        let coll = self.collection(collection);

        for name in existing
            .iter()
            .filter_map(index_name)
            .filter(|name| *name != ID_INDEX && !declared.contains(name))
        {
            trace_command(&self.database_name, collection, "dropIndex");
            coll.drop_index(name).await?;
            debug!(collection, index = name, "dropped undeclared index");
        }

        // Changed definitions are sent too so the server reports the conflict
        let missing: Vec<IndexModel> = indexes
            .iter()
            .filter(|spec| !existing.iter().any(|model| matches_spec(model, spec)))
            .map(index_model)
            .collect();
        if !missing.is_empty() {
            trace_command(&self.database_name, collection, "createIndexes");
            coll.create_indexes(missing).await?;
        }
        Ok(())
    }

    async fn drop_indexes(&self, collection: &str) -> Result<()> {
        trace_command(&self.database_name, collection, "dropIndexes");
        match self.collection(collection).drop_indexes().await {
            Ok(()) => Ok(()),
            Err(e) if is_namespace_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_indexes(&self, collection: &str, indexes: &[IndexSpec]) -> Result<()> {
        trace_command(&self.database_name, collection, "createIndexes");
        let models: Vec<IndexModel> = indexes.iter().map(index_model).collect();
        self.collection(collection).create_indexes(models).await?;
        Ok(())
    }

    async fn drop_database(&self) -> Result<()> {
        trace_command(&self.database_name, "$cmd", "dropDatabase");
        self.database.drop().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        trace_command(&self.database_name, "$cmd", "close");
        self.client.clone().shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_model_from_spec() {
        let spec = IndexSpec::single("email").unique(true);
        let model = index_model(&spec);
        assert_eq!(model.keys, doc! { "email": 1 });
        let options = model.options.unwrap();
        assert_eq!(options.name.as_deref(), Some("email_1"));
        assert_eq!(options.unique, Some(true));
        assert_eq!(options.sparse, Some(false));
    }

    #[test]
    fn test_compound_index_model() {
        let spec = IndexSpec::new(vec![("a".to_string(), 1), ("b.c".to_string(), -1)]);
        let model = index_model(&spec);
        assert_eq!(model.keys, doc! { "a": 1, "b.c": -1 });
        assert_eq!(model.options.unwrap().name.as_deref(), Some("a_1_b.c_-1"));
    }

    #[test]
    fn test_matches_spec() {
        let spec = IndexSpec::single("email").unique(true);
        assert!(matches_spec(&index_model(&spec), &spec));
        assert!(!matches_spec(&index_model(&IndexSpec::single("email")), &spec));
        assert!(!matches_spec(&index_model(&IndexSpec::single("name")), &spec));
    }

    #[tokio::test]
    async fn test_with_config_without_database_uses_test() {
        // Client construction does not dial, so no server is needed
        let backend = MongoBackend::new("mongodb://127.0.0.1:1").await.unwrap();
        assert_eq!(backend.database_name(), "test");
    }
}
