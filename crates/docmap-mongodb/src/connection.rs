//! Connection handles with lifecycle state
//!
//! A [`Connection`] exists before it is opened: models can be registered on
//! it while it is disconnected and stay registered across close/reopen.
//! Opening and closing are serialized per handle, so concurrent opens of the
//! same handle on the same URI dial out once.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use docmap_common::DocmapError;

use crate::backend::{Backend, Connector};
use crate::config::PoolConfig;
use crate::model::{to_collection_name, Model, ModelRef};
use crate::registry::ModelRegistry;
use crate::schema::{create_schema, Plugin, Schema, SchemaDefinition, SchemaOptions};
use crate::uri::ParsedUri;
use crate::Result;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle phase of a connection, numbered like the driver's ready state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    Disconnected = 0,
    Connected = 1,
    Connecting = 2,
    Disconnecting = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ReadyState::Connected,
            2 => ReadyState::Connecting,
            3 => ReadyState::Disconnecting,
            _ => ReadyState::Disconnected,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadyState::Disconnected => "disconnected",
            ReadyState::Connected => "connected",
            ReadyState::Connecting => "connecting",
            ReadyState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

struct Endpoint {
    uri: String,
    parsed: ParsedUri,
}

pub(crate) struct ConnectionInner {
    id: u64,
    state: AtomicU8,
    endpoint: RwLock<Option<Endpoint>>,
    backend: RwLock<Option<Arc<dyn Backend>>>,
    registry: ModelRegistry,
    lifecycle: Mutex<()>,
}

/// Handle to a live or pending database connection
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("ready_state", &self.ready_state())
            .field("name", &self.name())
            .field("models", &self.inner.registry.len())
            .finish()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Connection {}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// A new, disconnected handle with an empty model registry
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                state: AtomicU8::new(ReadyState::Disconnected as u8),
                endpoint: RwLock::new(None),
                backend: RwLock::new(None),
                registry: ModelRegistry::new(),
                lifecycle: Mutex::new(()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ConnectionInner>) -> Self {
        Self { inner }
    }

    /// Process-unique identifier
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ReadyState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.ready_state() == ReadyState::Connected
    }

    /// Connection string this handle was last opened with
    pub fn uri(&self) -> Option<String> {
        self.inner.endpoint.read().as_ref().map(|e| e.uri.clone())
    }

    /// Primary host of the last opened connection string
    pub fn host(&self) -> Option<String> {
        self.inner
            .endpoint
            .read()
            .as_ref()
            .and_then(|e| e.parsed.primary().map(|h| h.host.clone()))
    }

    pub fn port(&self) -> Option<u16> {
        self.inner
            .endpoint
            .read()
            .as_ref()
            .and_then(|e| e.parsed.primary().map(|h| h.port))
    }

    /// Database name
    pub fn name(&self) -> Option<String> {
        self.inner
            .endpoint
            .read()
            .as_ref()
            .map(|e| e.parsed.database.clone())
    }

    pub(crate) fn backend(&self) -> Option<Arc<dyn Backend>> {
        self.inner.backend.read().clone()
    }

    /// Open this handle on `uri`
    ///
    /// Returns immediately when the handle is already connected to the same
    /// URI. When it is connected elsewhere it is closed first. Models whose
    /// schema has `auto_index` get their indexes built once connected.
    #[instrument(skip_all, fields(connection = self.id()))]
    pub async fn open(&self, uri: &str, connector: &dyn Connector, pool: &PoolConfig) -> Result<()> {
        let parsed: ParsedUri = uri.parse()?;
        let _guard = self.inner.lifecycle.lock().await;

        if self.is_connected() {
            if self.uri().as_deref() == Some(uri) {
                debug!("already connected");
                return Ok(());
            }
            info!("reopening on a different connection string");
            self.close_locked().await?;
        }

        let redacted = parsed.redacted();
        *self.inner.endpoint.write() = Some(Endpoint {
            uri: uri.to_string(),
            parsed,
        });
        self.set_state(ReadyState::Connecting);

        match connector.open(uri, pool).await {
            Ok(backend) => {
                *self.inner.backend.write() = Some(backend);
                self.set_state(ReadyState::Connected);
                info!(uri = %redacted, "connected");
                self.build_auto_indexes().await;
                Ok(())
            }
            Err(e) => {
                self.set_state(ReadyState::Disconnected);
                warn!(uri = %redacted, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    /// Close this handle; closing a closed handle is a no-op
    #[instrument(skip(self), fields(connection = self.id()))]
    pub async fn close(&self) -> Result<()> {
        let _guard = self.inner.lifecycle.lock().await;
        self.close_locked().await
    }

    async fn close_locked(&self) -> Result<()> {
        let backend = self.inner.backend.write().take();
        let Some(backend) = backend else {
            self.set_state(ReadyState::Disconnected);
            return Ok(());
        };

        self.set_state(ReadyState::Disconnecting);
        let result = backend.close().await;
        self.set_state(ReadyState::Disconnected);
        match &result {
            Ok(()) => info!("disconnected"),
            Err(e) => warn!(error = %e, "close reported an error"),
        }
        result
    }

    /// Drop the database if connected, then close
    ///
    /// Both steps run under the lifecycle lock. The connection is closed even
    /// when the drop fails; the drop error is returned in that case.
    pub(crate) async fn drop_and_close(&self) -> Result<()> {
        let _guard = self.inner.lifecycle.lock().await;
        let dropped = match self.backend() {
            Some(backend) if self.is_connected() => {
                let database = backend.database_name().to_string();
                match backend.drop_database().await {
                    Ok(()) => {
                        info!(database = %database, "dropped database");
                        Ok(())
                    }
                    Err(e) => Err(DocmapError::maintenance("drop", &database, e)),
                }
            }
            _ => {
                debug!("not connected, nothing to drop");
                Ok(())
            }
        };

        let closed = self.close_locked().await;
        dropped?;
        closed
    }

    async fn build_auto_indexes(&self) {
        for model in self.models() {
            let options = model.schema().options();
            if !options.auto_index {
                continue;
            }
            if let Err(e) = model.create_indexes().await {
                if options.emit_index_errors {
                    error!(model = model.name(), error = %e, "index build failed");
                } else {
                    debug!(model = model.name(), error = %e, "index build failed");
                }
            }
        }
    }

    /// Get the model registered as `name`, or register `schema` under it
    ///
    /// A missing name is replaced by a generated one. An existing model is
    /// returned unchanged and `schema` is ignored. Returns `None` when the
    /// model does not exist and no schema is given, or when registration
    /// fails; the failure is logged.
    pub fn model(&self, name: Option<&str>, schema: Option<Schema>) -> Option<Model> {
        self.inner
            .registry
            .register_or_get(name, schema, self.inner.id, Arc::downgrade(&self.inner))
    }

    /// Registered model by name, without registering anything
    pub fn get_model(&self, name: &str) -> Option<Model> {
        self.inner.registry.get(name)
    }

    /// Registered models in name order
    pub fn models(&self) -> Vec<Model> {
        self.inner.registry.models()
    }

    /// Sorted, deduplicated registered model names
    pub fn model_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    /// Unregister the given models, or every model when `targets` is empty
    pub fn delete_models(&self, targets: &[ModelRef]) {
        self.inner.registry.delete(targets);
    }

    /// Build a root schema from `definition` and register it
    ///
    /// The model is named `options.model_name`, or gets a generated name.
    pub fn create_model(
        &self,
        definition: SchemaDefinition,
        options: ModelOptions,
        plugins: &[Plugin<'_>],
    ) -> Option<Model> {
        let schema = create_schema(definition, options.schema, plugins);
        self.model(options.model_name.as_deref(), Some(schema))
    }

    /// Collection of a registered model, or the derived name otherwise
    pub fn collection_name_of(&self, target: &ModelRef) -> String {
        match target {
            ModelRef::Model(model) => model.collection_name().to_string(),
            ModelRef::Name(name) => match self.get_model(name) {
                Some(model) => model.collection_name().to_string(),
                None => to_collection_name(name, None),
            },
        }
    }
}

/// Options for [`Connection::create_model`]
#[derive(Debug, Clone, Default)]
pub struct ModelOptions {
    pub model_name: Option<String>,
    /// Schema options; root defaults when `None`
    pub schema: Option<SchemaOptions>,
}

impl ModelOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            model_name: Some(name.into()),
            schema: None,
        }
    }

    pub fn with_schema_options(mut self, options: SchemaOptions) -> Self {
        self.schema = Some(options);
        self
    }
}

/// True if `value` is a [`Connection`]
pub fn is_connection(value: &dyn Any) -> bool {
    value.downcast_ref::<Connection>().is_some()
}

/// True if `value` is a [`Connection`] in the connected state
pub fn is_connected(value: &dyn Any) -> bool {
    value
        .downcast_ref::<Connection>()
        .is_some_and(Connection::is_connected)
}

/// True if `value` is a [`Schema`]
pub fn is_schema(value: &dyn Any) -> bool {
    value.downcast_ref::<Schema>().is_some()
}

/// True if `value` is a [`Model`]
pub fn is_model(value: &dyn Any) -> bool {
    value.downcast_ref::<Model>().is_some()
}
