//! Process-wide manager
//!
//! The free functions here act on one shared [`ConnectionManager`], created
//! from the environment on first use. Tests swap it out with [`install`] and
//! [`reset`].

use std::sync::Arc;

use parking_lot::RwLock;

use crate::connection::{Connection, ModelOptions};
use crate::manager::ConnectionManager;
use crate::model::{Model, ModelRef};
use crate::registry::Arg;
use crate::schema::{Plugin, SchemaDefinition};
use crate::Result;

pub use crate::backend::{disable_debug, enable_debug};

static MANAGER: RwLock<Option<Arc<ConnectionManager>>> = RwLock::new(None);

/// The shared manager, created from the environment if none is installed
pub fn manager() -> Arc<ConnectionManager> {
    if let Some(manager) = MANAGER.read().as_ref() {
        return Arc::clone(manager);
    }
    let mut slot = MANAGER.write();
    Arc::clone(slot.get_or_insert_with(|| Arc::new(ConnectionManager::from_env())))
}

/// Replace the shared manager, returning the previous one
pub fn install(manager: ConnectionManager) -> Option<Arc<ConnectionManager>> {
    MANAGER.write().replace(Arc::new(manager))
}

/// Forget the shared manager without closing its connections
///
/// Useful for testing.
pub fn reset() {
    *MANAGER.write() = None;
}

/// The shared manager's default connection
pub fn connection() -> Connection {
    manager().connection().clone()
}

pub async fn connect(uri: Option<&str>) -> Result<Connection> {
    manager().connect(uri).await
}

pub async fn connect_new(uri: Option<&str>) -> Result<Connection> {
    manager().connect_new(uri).await
}

pub async fn disconnect(connection: Option<&Connection>) -> Result<()> {
    manager().disconnect(connection).await
}

pub fn model<I>(args: I) -> Option<Model>
where
    I: IntoIterator<Item = Arg>,
{
    manager().model(args)
}

pub fn model_names(connection: Option<&Connection>) -> Vec<String> {
    manager().model_names(connection)
}

pub fn delete_models<I>(args: I)
where
    I: IntoIterator<Item = Arg>,
{
    manager().delete_models(args)
}

pub fn create_model(
    definition: SchemaDefinition,
    options: ModelOptions,
    plugins: &[Plugin<'_>],
) -> Option<Model> {
    manager().create_model(definition, options, plugins)
}

pub fn collection_name_of(target: impl Into<ModelRef>) -> String {
    manager().collection_name_of(target)
}

pub async fn clear<I>(args: I) -> Result<()>
where
    I: IntoIterator<Item = Arg>,
{
    manager().clear(args).await
}

pub async fn sync_indexes(connection: Option<&Connection>) -> Result<()> {
    manager().sync_indexes(connection).await
}

pub async fn drop_database(connection: Option<&Connection>) -> Result<()> {
    manager().drop_database(connection).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectConfig;
    use crate::memory::MemoryConnector;
    use crate::schema::{create_schema, FieldDef};

    // The shared manager is process state, so everything touching it lives in
    // one test.
    #[tokio::test]
    async fn test_shared_manager_lifecycle() {
        let connector = MemoryConnector::new();
        install(ConnectionManager::new(ConnectConfig::default(), connector.clone().into()));

        let schema = create_schema(
            SchemaDefinition::new().field("name", FieldDef::string()),
            None,
            &[],
        );
        let user = model(vec![Arg::from("User"), Arg::from(schema)]).unwrap();
        assert_eq!(model(vec![Arg::from("User")]), Some(user.clone()));
        assert_eq!(model_names(None), vec!["User"]);
        assert_eq!(collection_name_of(&user), "users");

        let default = connect(Some("mongodb://localhost/shared")).await.unwrap();
        assert_eq!(default, connection());

        drop_database(None).await.unwrap();
        assert!(!connection().is_connected());
        disconnect(None).await.unwrap();

        delete_models(Vec::<Arg>::new());
        assert!(model_names(None).is_empty());

        let previous = install(ConnectionManager::new(ConnectConfig::default(), connector.into()));
        assert!(previous.is_some());
        assert!(model_names(None).is_empty());

        reset();
        assert!(MANAGER.read().is_none());
    }
}
