//! Per-connection model registry and argument classification

use std::collections::BTreeMap;
use std::sync::Weak;

use docmap_common::DocmapError;
use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::connection::{Connection, ConnectionInner};
use crate::model::{to_collection_name, Model, ModelRef};
use crate::schema::Schema;
use crate::validation::{validate_model_name, ValidatedCollectionName};
use crate::Result;

/// Models registered on one connection, keyed by name
///
/// Registration checks and inserts under one write lock, so concurrent
/// registrations of the same name resolve to a single model.
#[derive(Default)]
pub struct ModelRegistry {
    models: RwLock<BTreeMap<String, Model>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Model> {
        self.models.read().get(name).cloned()
    }

    /// Sorted registered names; unique by construction
    pub fn names(&self) -> Vec<String> {
        self.models.read().keys().cloned().collect()
    }

    pub fn models(&self) -> Vec<Model> {
        self.models.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }

    /// Existing model for `name`, or a newly registered one built from `schema`
    ///
    /// Registration errors are logged and yield `None`.
    pub(crate) fn register_or_get(
        &self,
        name: Option<&str>,
        schema: Option<Schema>,
        connection_id: u64,
        connection: Weak<ConnectionInner>,
    ) -> Option<Model> {
        let name = match name {
            Some(name) => name.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        if let Some(existing) = self.get(&name) {
            return Some(existing);
        }
        let Some(schema) = schema else {
            debug!(model = %name, "model is not registered and no schema was given");
            return None;
        };

        match self.try_register(name.clone(), schema, connection_id, connection) {
            Ok(model) => Some(model),
            Err(e) => {
                warn!(model = %name, error = %e, "model registration failed");
                None
            }
        }
    }

    fn try_register(
        &self,
        name: String,
        schema: Schema,
        connection_id: u64,
        connection: Weak<ConnectionInner>,
    ) -> Result<Model> {
        validate_model_name(&name)
            .map_err(|e| DocmapError::Registration(format!("model '{}': {}", name, e)))?;
        let collection = ValidatedCollectionName::new(&to_collection_name(&name, Some(&schema)))
            .map_err(|e| DocmapError::Registration(format!("model '{}': {}", name, e)))?;

        let mut models = self.models.write();
        if let Some(existing) = models.get(&name) {
            return Ok(existing.clone());
        }
        let model = Model::new(name.clone(), collection, schema, connection_id, connection);
        models.insert(name, model.clone());
        debug!(model = model.name(), collection = model.collection_name(), "registered model");
        Ok(model)
    }

    /// Unregister `targets`, or everything when `targets` is empty
    pub fn delete(&self, targets: &[ModelRef]) {
        let mut models = self.models.write();
        if targets.is_empty() {
            models.clear();
            return;
        }
        for target in targets {
            if models.remove(target.name()).is_none() {
                debug!(model = target.name(), "delete of unregistered model ignored");
            }
        }
    }
}

/// A loosely typed argument to the registry helpers
///
/// Arguments are recognized in this order: connection, schema, model, name.
#[derive(Debug, Clone)]
pub enum Arg {
    Connection(Connection),
    Schema(Schema),
    Model(Model),
    Name(String),
}

impl Arg {
    pub fn is_connection(&self) -> bool {
        matches!(self, Arg::Connection(_))
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, Arg::Schema(_))
    }

    pub fn is_model(&self) -> bool {
        matches!(self, Arg::Model(_))
    }

    pub fn is_name(&self) -> bool {
        matches!(self, Arg::Name(_))
    }
}

impl From<Connection> for Arg {
    fn from(connection: Connection) -> Self {
        Arg::Connection(connection)
    }
}

impl From<&Connection> for Arg {
    fn from(connection: &Connection) -> Self {
        Arg::Connection(connection.clone())
    }
}

impl From<Schema> for Arg {
    fn from(schema: Schema) -> Self {
        Arg::Schema(schema)
    }
}

impl From<Model> for Arg {
    fn from(model: Model) -> Self {
        Arg::Model(model)
    }
}

impl From<&Model> for Arg {
    fn from(model: &Model) -> Self {
        Arg::Model(model.clone())
    }
}

impl From<&str> for Arg {
    fn from(name: &str) -> Self {
        Arg::Name(name.to_string())
    }
}

impl From<String> for Arg {
    fn from(name: String) -> Self {
        Arg::Name(name)
    }
}

impl From<ModelRef> for Arg {
    fn from(target: ModelRef) -> Self {
        match target {
            ModelRef::Name(name) => Arg::Name(name),
            ModelRef::Model(model) => Arg::Model(model),
        }
    }
}

/// Arguments sorted by kind
///
/// Only the first connection and the first schema are kept. Names and
/// models are kept in order as `targets`.
#[derive(Debug, Clone, Default)]
pub struct ModelArgs {
    pub connection: Option<Connection>,
    pub schema: Option<Schema>,
    pub targets: Vec<ModelRef>,
}

impl ModelArgs {
    pub fn classify<I>(args: I) -> Self
    where
        I: IntoIterator<Item = Arg>,
    {
        let mut classified = ModelArgs::default();
        for arg in args {
            match arg {
                Arg::Connection(connection) => {
                    if classified.connection.is_none() {
                        classified.connection = Some(connection);
                    } else {
                        debug!(connection = connection.id(), "extra connection argument ignored");
                    }
                }
                Arg::Schema(schema) => {
                    if classified.schema.is_none() {
                        classified.schema = Some(schema);
                    } else {
                        debug!("extra schema argument ignored");
                    }
                }
                Arg::Model(model) => classified.targets.push(ModelRef::Model(model)),
                Arg::Name(name) => classified.targets.push(ModelRef::Name(name)),
            }
        }
        classified
    }

    /// First model name given, if any
    pub fn name(&self) -> Option<&str> {
        self.targets.first().map(ModelRef::name)
    }

    /// Connection the arguments target
    ///
    /// An explicit connection wins, then the connection of the first model
    /// handle given.
    pub fn target_connection(&self) -> Option<Connection> {
        self.connection.clone().or_else(|| {
            self.targets.iter().find_map(|target| match target {
                ModelRef::Model(model) => model.connection(),
                ModelRef::Name(_) => None,
            })
        })
    }

    /// Target names, first occurrence order, duplicates removed
    pub fn target_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            if !names.iter().any(|name| name == target.name()) {
                names.push(target.name().to_string());
            }
        }
        names
    }
}
