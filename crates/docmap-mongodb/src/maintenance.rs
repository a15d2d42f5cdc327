//! Database maintenance: clearing collections, syncing indexes, dropping
//!
//! Every operation here is a no-op on a connection that is not connected,
//! except [`drop_database`] which still closes it.

use docmap_common::DocmapError;
use futures::future::try_join_all;
use tracing::{debug, info, instrument, warn};

use crate::connection::Connection;
use crate::manager::ConnectionManager;
use crate::model::{Model, ModelRef};
use crate::registry::{Arg, ModelArgs};
use crate::Result;

/// Delete every document of the given models, or of every registered model
///
/// Models are cleared one after another in order; the first failure stops
/// the run. Names that are not registered are skipped.
#[instrument(skip_all, fields(connection = connection.id()))]
pub async fn clear(connection: &Connection, targets: &[ModelRef]) -> Result<()> {
    if !connection.is_connected() {
        debug!("not connected, nothing to clear");
        return Ok(());
    }

    let names = if targets.is_empty() {
        connection.model_names()
    } else {
        let mut names: Vec<String> = Vec::with_capacity(targets.len());
        for target in targets {
            if !names.iter().any(|name| name == target.name()) {
                names.push(target.name().to_string());
            }
        }
        names
    };

    for name in &names {
        let Some(model) = connection.get_model(name) else {
            debug!(model = %name, "not registered, skipping");
            continue;
        };
        model
            .delete_all()
            .await
            .map_err(|e| DocmapError::maintenance("clear", model.collection_name(), e))?;
    }
    Ok(())
}

async fn sync_model(model: &Model) -> Result<()> {
    let result = match model.sync_indexes().await {
        Err(e) if e.is_namespace_exists() => {
            warn!(model = model.name(), error = %e, "index conflict, rebuilding indexes");
            rebuild_indexes(model).await
        }
        other => other,
    };
    result.map_err(|e| DocmapError::maintenance("sync indexes", model.collection_name(), e))
}

async fn rebuild_indexes(model: &Model) -> Result<()> {
    model.clean_indexes().await?;
    model.create_indexes().await
}

/// Make every registered model's indexes match its schema
///
/// Models are synced concurrently. A model whose sync collides with an
/// existing index has its indexes dropped and rebuilt instead.
#[instrument(skip_all, fields(connection = connection.id()))]
pub async fn sync_indexes(connection: &Connection) -> Result<()> {
    if !connection.is_connected() {
        debug!("not connected, nothing to sync");
        return Ok(());
    }

    let models = connection.models();
    try_join_all(models.iter().map(sync_model)).await?;
    info!(models = models.len(), "indexes synced");
    Ok(())
}

/// Drop the connection's database, then close the connection
///
/// The connection is closed even when the drop fails; the drop error is
/// returned in that case. An open racing the drop waits for it to finish.
#[instrument(skip_all, fields(connection = connection.id()))]
pub async fn drop_database(connection: &Connection) -> Result<()> {
    connection.drop_and_close().await
}

impl ConnectionManager {
    /// [`clear`] on the connection the arguments target
    pub async fn clear<I>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = Arg>,
    {
        let args = ModelArgs::classify(args);
        let connection = args
            .target_connection()
            .unwrap_or_else(|| self.connection().clone());
        clear(&connection, &args.targets).await
    }

    /// [`sync_indexes`] on `connection`, or on the default connection
    pub async fn sync_indexes(&self, connection: Option<&Connection>) -> Result<()> {
        sync_indexes(connection.unwrap_or_else(|| self.connection())).await
    }

    /// [`drop_database`] on `connection`, or on the default connection
    pub async fn drop_database(&self, connection: Option<&Connection>) -> Result<()> {
        drop_database(connection.unwrap_or_else(|| self.connection())).await
    }
}
