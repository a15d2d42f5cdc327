//! The narrow interface to the database driver
//!
//! Everything docmap does against a server goes through [`Backend`]; opening
//! one goes through [`Connector`]. The driver-backed implementation lives in
//! [`crate::mongo`] and an in-memory one in [`crate::memory`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::PoolConfig;
use crate::schema::IndexSpec;
use crate::Result;

/// Name of the index every collection carries and index sync never drops
pub const ID_INDEX: &str = "_id_";

static DEBUG: AtomicBool = AtomicBool::new(false);

/// Log every issued command at info level
pub fn enable_debug() {
    DEBUG.store(true, Ordering::Relaxed);
}

/// Stop logging issued commands
pub fn disable_debug() {
    DEBUG.store(false, Ordering::Relaxed);
}

pub fn is_debug() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

/// Trace a command about to be sent; promoted to info while debugging
pub(crate) fn trace_command(database: &str, collection: &str, command: &str) {
    if is_debug() {
        tracing::info!(target: "docmap::command", "{}.{}.{}()", database, collection, command);
    } else {
        tracing::trace!(target: "docmap::command", "{}.{}.{}()", database, collection, command);
    }
}

/// Operations a live connection provides
#[async_trait]
pub trait Backend: Send + Sync {
    /// Database this backend operates on
    fn database_name(&self) -> &str;

    /// Confirm the server is reachable
    async fn ping(&self) -> Result<()>;

    /// Delete every document in `collection`, returning the number deleted
    async fn delete_many(&self, collection: &str) -> Result<u64>;

    async fn create_collection(&self, collection: &str) -> Result<()>;

    /// Index names present on `collection`; empty if it does not exist
    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>>;

    /// Create missing declared indexes and drop undeclared ones except `_id_`
    ///
    /// Fails with `DocmapError::NamespaceExists` when an index collides with
    /// an existing one of a different shape.
    async fn sync_indexes(&self, collection: &str, indexes: &[IndexSpec]) -> Result<()>;

    /// Drop every index on `collection` except `_id_`
    async fn drop_indexes(&self, collection: &str) -> Result<()>;

    async fn create_indexes(&self, collection: &str, indexes: &[IndexSpec]) -> Result<()>;

    async fn drop_database(&self) -> Result<()>;

    /// Release the underlying connection
    async fn close(&self) -> Result<()>;
}

/// Opens backends for connection strings
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, uri: &str, pool: &PoolConfig) -> Result<Arc<dyn Backend>>;
}
