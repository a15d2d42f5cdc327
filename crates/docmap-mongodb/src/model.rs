//! Registered models
//!
//! A [`Model`] is a schema bound to a name on one connection. It is a cheap
//! handle: clones share the same registration, and it only holds a weak
//! reference back to its connection so dropping the connection drops the
//! registry with it.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use docmap_common::DocmapError;
use regex::Regex;
use tracing::{debug, instrument};

use crate::backend::Backend;
use crate::connection::{Connection, ConnectionInner};
use crate::schema::{IndexSpec, Schema};
use crate::validation::ValidatedCollectionName;
use crate::Result;

/// Words whose plural is the word itself
const UNCOUNTABLES: &[&str] = &[
    "advice", "energy", "excretion", "digestion", "cooperation", "health", "justice", "labour",
    "machinery", "equipment", "information", "pollution", "sewage", "paper", "money", "species",
    "series", "rain", "rice", "fish", "sheep", "moose", "deer", "news", "expertise", "status",
    "media",
];

/// Pluralization rules, first match wins
fn plural_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"(m)an$", "${1}en"),
            (r"(pe)rson$", "${1}ople"),
            (r"(child)$", "${1}ren"),
            (r"^(ox)$", "${1}en"),
            (r"(ax|test)is$", "${1}es"),
            (r"(octop|vir)us$", "${1}i"),
            (r"(alias|status)$", "${1}es"),
            (r"(bu)s$", "${1}ses"),
            (r"(buffal|tomat|potat)o$", "${1}oes"),
            (r"([ti])um$", "${1}a"),
            (r"sis$", "ses"),
            (r"(?:([^f])fe|([lr])f)$", "${1}${2}ves"),
            (r"(hive)$", "${1}s"),
            (r"([^aeiouy]|qu)y$", "${1}ies"),
            (r"(x|ch|ss|sh)$", "${1}es"),
            (r"(matr|vert|ind)ix|ex$", "${1}ices"),
            (r"([ml])ouse$", "${1}ice"),
            (r"(kn|w|l)ife$", "${1}ives"),
            (r"(quiz)$", "${1}zes"),
            (r"s$", "s"),
            (r"([^a-z])$", "${1}"),
            (r"$", "s"),
        ]
        .into_iter()
        .map(|(pattern, replacement)| {
            // Patterns are literals above; a failure here is a programming error.
            (Regex::new(pattern).expect("invalid pluralization rule"), replacement)
        })
        .collect()
    })
}

/// Lower-cased English plural of `name`
///
/// ```
/// use docmap_mongodb::model::pluralize;
/// assert_eq!(pluralize("Edge"), "edges");
/// assert_eq!(pluralize("Category"), "categories");
/// ```
pub fn pluralize(name: &str) -> String {
    let lower = name.to_lowercase();
    if UNCOUNTABLES.contains(&lower.as_str()) {
        return lower;
    }
    match plural_rules().iter().find(|(rule, _)| rule.is_match(&lower)) {
        Some((rule, replacement)) => rule.replace_all(&lower, *replacement).into_owned(),
        None => lower,
    }
}

/// Collection name a model called `name` is stored in when `schema` does not
/// name one explicitly
pub fn to_collection_name(name: &str, schema: Option<&Schema>) -> String {
    schema
        .and_then(|s| s.options().collection.clone())
        .unwrap_or_else(|| pluralize(name))
}

pub(crate) struct ModelInner {
    name: String,
    collection: ValidatedCollectionName,
    schema: Arc<Schema>,
    connection_id: u64,
    connection: Weak<ConnectionInner>,
}

/// A schema bound to a name on a connection
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.inner.name)
            .field("collection", &self.inner.collection.as_str())
            .field("connection_id", &self.inner.connection_id)
            .finish()
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Model {}

impl Model {
    pub(crate) fn new(
        name: String,
        collection: ValidatedCollectionName,
        schema: Schema,
        connection_id: u64,
        connection: Weak<ConnectionInner>,
    ) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                name,
                collection,
                schema: Arc::new(schema),
                connection_id,
                connection,
            }),
        }
    }

    /// Registered model name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn collection_name(&self) -> &str {
        self.inner.collection.as_str()
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Id of the connection this model is registered on
    pub fn connection_id(&self) -> u64 {
        self.inner.connection_id
    }

    /// The owning connection, unless it has been dropped
    pub fn connection(&self) -> Option<Connection> {
        self.inner.connection.upgrade().map(Connection::from_inner)
    }

    /// Indexes declared by the schema
    pub fn declared_indexes(&self) -> Vec<IndexSpec> {
        self.inner.schema.indexes()
    }

    fn backend(&self) -> Result<Arc<dyn Backend>> {
        let connection = self.connection().ok_or_else(|| {
            DocmapError::Connection(format!("connection of model '{}' has been dropped", self.name()))
        })?;
        connection.backend().ok_or_else(|| {
            DocmapError::Connection(format!(
                "connection {} of model '{}' is not open",
                connection.id(),
                self.name()
            ))
        })
    }

    /// Delete every document in the model's collection
    #[instrument(skip(self), fields(model = %self.name()))]
    pub async fn delete_all(&self) -> Result<u64> {
        let deleted = self.backend()?.delete_many(self.collection_name()).await?;
        debug!(deleted, collection = self.collection_name(), "cleared collection");
        Ok(deleted)
    }

    /// Create the model's collection explicitly
    pub async fn create_collection(&self) -> Result<()> {
        self.backend()?.create_collection(self.collection_name()).await
    }

    /// Names of the indexes present on the server
    pub async fn list_indexes(&self) -> Result<Vec<String>> {
        self.backend()?.list_indexes(self.collection_name()).await
    }

    /// Make the server's indexes match the declared ones
    pub async fn sync_indexes(&self) -> Result<()> {
        let indexes = self.declared_indexes();
        self.backend()?.sync_indexes(self.collection_name(), &indexes).await
    }

    /// Drop every index except `_id_`
    pub async fn clean_indexes(&self) -> Result<()> {
        self.backend()?.drop_indexes(self.collection_name()).await
    }

    /// Create the declared indexes
    pub async fn create_indexes(&self) -> Result<()> {
        let indexes = self.declared_indexes();
        if indexes.is_empty() {
            return Ok(());
        }
        self.backend()?.create_indexes(self.collection_name(), &indexes).await
    }
}

/// A model given either by name or by handle
#[derive(Debug, Clone, PartialEq)]
pub enum ModelRef {
    Name(String),
    Model(Model),
}

impl ModelRef {
    pub fn name(&self) -> &str {
        match self {
            ModelRef::Name(name) => name,
            ModelRef::Model(model) => model.name(),
        }
    }
}

impl From<&str> for ModelRef {
    fn from(name: &str) -> Self {
        ModelRef::Name(name.to_string())
    }
}

impl From<String> for ModelRef {
    fn from(name: String) -> Self {
        ModelRef::Name(name)
    }
}

impl From<Model> for ModelRef {
    fn from(model: Model) -> Self {
        ModelRef::Model(model)
    }
}

impl From<&Model> for ModelRef {
    fn from(model: &Model) -> Self {
        ModelRef::Model(model.clone())
    }
}
