//! Connection manager
//!
//! Owns the default connection and any extra connections opened with
//! [`ConnectionManager::connect_new`], and routes the registry helpers to the
//! connection their arguments name.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use crate::backend::Connector;
use crate::config::ConnectConfig;
use crate::connection::{Connection, ModelOptions};
use crate::model::{Model, ModelRef};
use crate::mongo::MongoConnector;
use crate::registry::{Arg, ModelArgs};
use crate::schema::{Plugin, SchemaDefinition};
use crate::Result;

pub struct ConnectionManager {
    config: ConnectConfig,
    connector: Arc<dyn Connector>,
    default: Connection,
    extra: RwLock<Vec<Connection>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("default", &self.default)
            .field("extra", &self.extra.read().len())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(config: ConnectConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            default: Connection::new(),
            extra: RwLock::new(Vec::new()),
        }
    }

    /// Manager that connects through the MongoDB driver
    pub fn mongo(config: ConnectConfig) -> Self {
        Self::new(config, MongoConnector.into())
    }

    /// Driver-backed manager configured from the process environment
    pub fn from_env() -> Self {
        Self::mongo(ConnectConfig::from_env())
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    /// The default connection; exists before the first connect
    pub fn connection(&self) -> &Connection {
        &self.default
    }

    /// The default connection followed by every extra one
    pub fn connections(&self) -> Vec<Connection> {
        std::iter::once(self.default.clone())
            .chain(self.extra.read().iter().cloned())
            .collect()
    }

    fn resolve(&self, connection: Option<Connection>) -> Connection {
        connection.unwrap_or_else(|| self.default.clone())
    }

    /// Explicit URI > `MONGODB_URI`/`MONGODB_URL` > derived default
    pub fn resolve_uri(&self, explicit: Option<&str>) -> String {
        self.config.resolve_uri(explicit)
    }

    /// Open the default connection
    ///
    /// Returns the already open default connection when it is connected to
    /// the same URI; concurrent calls share one open.
    #[instrument(skip_all)]
    pub async fn connect(&self, uri: Option<&str>) -> Result<Connection> {
        let uri = self.resolve_uri(uri);
        self.default
            .open(&uri, self.connector.as_ref(), &self.config.pool)
            .await?;
        Ok(self.default.clone())
    }

    /// Open a new connection that does not replace the default one
    #[instrument(skip_all)]
    pub async fn connect_new(&self, uri: Option<&str>) -> Result<Connection> {
        let uri = self.resolve_uri(uri);
        let connection = Connection::new();
        connection
            .open(&uri, self.connector.as_ref(), &self.config.pool)
            .await?;
        self.extra.write().push(connection.clone());
        info!(connection = connection.id(), "opened additional connection");
        Ok(connection)
    }

    /// Close `connection`, or every connection when `None`
    ///
    /// Every connection is closed even if one fails; the first error is
    /// returned.
    #[instrument(skip_all)]
    pub async fn disconnect(&self, connection: Option<&Connection>) -> Result<()> {
        match connection {
            Some(connection) => {
                self.extra.write().retain(|c| c != connection);
                connection.close().await
            }
            None => {
                let extra: Vec<Connection> = std::mem::take(&mut *self.extra.write());
                let mut first_error = None;
                for connection in std::iter::once(&self.default).chain(extra.iter()) {
                    if let Err(e) = connection.close().await {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
                match first_error {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }
        }
    }

    /// Look up or register a model
    ///
    /// Arguments are classified by [`ModelArgs::classify`]: the first name
    /// (or model handle) is the model name, the first schema registers it if
    /// it is missing, and a connection argument picks the registry.
    pub fn model<I>(&self, args: I) -> Option<Model>
    where
        I: IntoIterator<Item = Arg>,
    {
        let args = ModelArgs::classify(args);
        let connection = self.resolve(args.target_connection());
        let name = args.name().map(str::to_string);
        connection.model(name.as_deref(), args.schema)
    }

    /// Registered names on `connection`, or on the default connection
    pub fn model_names(&self, connection: Option<&Connection>) -> Vec<String> {
        self.resolve(connection.cloned()).model_names()
    }

    /// Unregister the named models, or every model when none is named
    pub fn delete_models<I>(&self, args: I)
    where
        I: IntoIterator<Item = Arg>,
    {
        let args = ModelArgs::classify(args);
        let connection = self.resolve(args.target_connection());
        debug!(connection = connection.id(), targets = args.targets.len(), "deleting models");
        connection.delete_models(&args.targets);
    }

    /// Build a root schema and register it on the default connection
    pub fn create_model(
        &self,
        definition: SchemaDefinition,
        options: ModelOptions,
        plugins: &[Plugin<'_>],
    ) -> Option<Model> {
        self.default.create_model(definition, options, plugins)
    }

    /// Collection name for a model given by name or handle
    pub fn collection_name_of(&self, target: impl Into<ModelRef>) -> String {
        let target = target.into();
        let connection = match &target {
            ModelRef::Model(model) => model.connection(),
            ModelRef::Name(_) => None,
        };
        self.resolve(connection).collection_name_of(&target)
    }
}
