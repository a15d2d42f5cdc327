//! Schema definitions and option presets
//!
//! A [`Schema`] describes a document's fields, the secondary indexes declared
//! on them and the options the model is created with. Schemas are independent
//! of any connection; they are bound to one when a model is registered.

use serde::{Deserialize, Serialize};

/// Names of the fields maintained when `timestamps` is enabled
pub const TIMESTAMP_FIELDS: [&str; 2] = ["createdAt", "updatedAt"];

/// Serialization options (`toJSON` / `toObject`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializeOptions {
    /// Apply getters when serializing
    pub getters: bool,
}

/// Options a schema is created with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaOptions {
    /// Expose a virtual string `id` alongside `_id`
    pub id: bool,
    /// Persist an `_id` on each document
    #[serde(rename = "_id")]
    pub with_id: bool,
    /// Maintain `createdAt` / `updatedAt`
    pub timestamps: bool,
    pub to_json: Option<SerializeOptions>,
    pub to_object: Option<SerializeOptions>,
    /// Log index build failures at error level instead of debug
    pub emit_index_errors: bool,
    /// Build declared indexes when the model's connection opens
    pub auto_index: bool,
    /// Explicit collection name instead of the pluralized model name
    pub collection: Option<String>,
}

/// Defaults for root documents
pub const SCHEMA_OPTIONS: SchemaOptions = SchemaOptions {
    id: false,
    with_id: true,
    timestamps: true,
    to_json: Some(SerializeOptions { getters: true }),
    to_object: Some(SerializeOptions { getters: true }),
    emit_index_errors: true,
    auto_index: true,
    collection: None,
};

/// Defaults for embedded documents
pub const SUB_SCHEMA_OPTIONS: SchemaOptions = SchemaOptions {
    id: false,
    with_id: false,
    timestamps: false,
    to_json: None,
    to_object: None,
    emit_index_errors: true,
    auto_index: true,
    collection: None,
};

impl Default for SchemaOptions {
    fn default() -> Self {
        SCHEMA_OPTIONS
    }
}

/// Field type of a schema path
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    ObjectId,
    /// Any BSON value
    Mixed,
    Array(Box<FieldType>),
    /// Nested sub-document; never carries its own `_id`
    Embedded(Box<Schema>),
}

impl FieldType {
    /// Same type with every nested schema stripped of its `_id`
    fn without_nested_ids(self) -> Self {
        match self {
            FieldType::Embedded(schema) => FieldType::Embedded(Box::new(schema.into_embedded())),
            FieldType::Array(inner) => FieldType::Array(Box::new(inner.without_nested_ids())),
            other => other,
        }
    }
}

/// Type and constraints of a single field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub kind: FieldType,
    pub index: bool,
    pub unique: bool,
    pub sparse: bool,
    pub required: bool,
}

impl FieldDef {
    /// Field of `kind`; embedded schemas lose their `_id`, also inside arrays
    pub fn new(kind: FieldType) -> Self {
        Self {
            kind: kind.without_nested_ids(),
            index: false,
            unique: false,
            sparse: false,
            required: false,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn date() -> Self {
        Self::new(FieldType::Date)
    }

    pub fn object_id() -> Self {
        Self::new(FieldType::ObjectId)
    }

    pub fn mixed() -> Self {
        Self::new(FieldType::Mixed)
    }

    pub fn array(of: FieldType) -> Self {
        Self::new(FieldType::Array(Box::new(of)))
    }

    /// Nested document field
    ///
    /// The nested schema is stripped of its `_id` so embedded documents never
    /// persist an identifier of their own.
    pub fn embedded(schema: Schema) -> Self {
        Self::new(FieldType::Embedded(Box::new(schema)))
    }

    /// Declare a single-field ascending index on this path
    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    /// Declare a unique index on this path
    pub fn unique(mut self) -> Self {
        self.index = true;
        self.unique = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Ordered mapping of field name to field definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDefinition {
    fields: Vec<(String, FieldDef)>,
}

impl SchemaDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field, keeping its original position on replace
    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.insert(name.into(), def);
        self
    }

    fn insert(&mut self, name: String, mut def: FieldDef) {
        // Definitions built as struct literals skip FieldDef::new
        def.kind = def.kind.without_nested_ids();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = def,
            None => self.fields.push((name, def)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, FieldDef)> for SchemaDefinition {
    fn from_iter<I: IntoIterator<Item = (S, FieldDef)>>(iter: I) -> Self {
        let mut definition = SchemaDefinition::new();
        for (name, def) in iter {
            definition.insert(name.into(), def);
        }
        definition
    }
}

/// A declared secondary index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Server-side index name, e.g. `name_1`
    pub name: String,
    /// Ordered `(path, direction)` pairs; direction is 1 or -1
    pub keys: Vec<(String, i32)>,
    pub unique: bool,
    pub sparse: bool,
}

impl IndexSpec {
    /// Index over `keys` named the way the server names it by default
    pub fn new(keys: Vec<(String, i32)>) -> Self {
        let name = keys
            .iter()
            .map(|(path, dir)| format!("{}_{}", path, dir))
            .collect::<Vec<_>>()
            .join("_");
        Self {
            name,
            keys,
            unique: false,
            sparse: false,
        }
    }

    pub fn single(path: impl Into<String>) -> Self {
        Self::new(vec![(path.into(), 1)])
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }
}

/// A compiled schema: field definitions, explicit indexes and options
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    definition: SchemaDefinition,
    options: SchemaOptions,
    extra_indexes: Vec<IndexSpec>,
}

impl Schema {
    pub fn new(definition: SchemaDefinition, options: SchemaOptions) -> Self {
        Self {
            definition,
            options,
            extra_indexes: Vec::new(),
        }
    }

    pub fn definition(&self) -> &SchemaDefinition {
        &self.definition
    }

    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut SchemaOptions {
        &mut self.options
    }

    /// Add or replace a field after construction (used by plugins)
    pub fn add_field(&mut self, name: impl Into<String>, def: FieldDef) -> &mut Self {
        self.definition.insert(name.into(), def);
        self
    }

    /// Declare an explicit (possibly compound) index
    pub fn index(&mut self, spec: IndexSpec) -> &mut Self {
        self.extra_indexes.retain(|existing| existing.name != spec.name);
        self.extra_indexes.push(spec);
        self
    }

    /// Look up a field by dotted path, descending into embedded schemas
    pub fn path(&self, path: &str) -> Option<&FieldDef> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let field = self.definition.get(head)?;
        match rest {
            None => Some(field),
            Some(rest) => match nested_schema(&field.kind) {
                Some(schema) => schema.path(rest),
                None => None,
            },
        }
    }

    /// All dotted paths, including timestamp fields when enabled
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_paths(self, "", &mut paths);
        if self.options.timestamps {
            paths.extend(TIMESTAMP_FIELDS.iter().map(|f| f.to_string()));
        }
        paths
    }

    /// Every index this schema declares, field-level ones first
    pub fn indexes(&self) -> Vec<IndexSpec> {
        let mut indexes = Vec::new();
        collect_field_indexes(self, "", &mut indexes);
        for spec in &self.extra_indexes {
            if !indexes.iter().any(|i| i.name == spec.name) {
                indexes.push(spec.clone());
            }
        }
        indexes
    }

    /// Copy of this schema suitable for embedding
    pub fn into_embedded(mut self) -> Self {
        self.options.with_id = false;
        self.options.id = false;
        self
    }
}

fn nested_schema(kind: &FieldType) -> Option<&Schema> {
    match kind {
        FieldType::Embedded(schema) => Some(schema),
        FieldType::Array(inner) => nested_schema(inner),
        _ => None,
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn collect_paths(schema: &Schema, prefix: &str, out: &mut Vec<String>) {
    for (name, field) in schema.definition.iter() {
        let path = join_path(prefix, name);
        match nested_schema(&field.kind) {
            Some(nested) => collect_paths(nested, &path, out),
            None => out.push(path),
        }
    }
}

fn collect_field_indexes(schema: &Schema, prefix: &str, out: &mut Vec<IndexSpec>) {
    for (name, field) in schema.definition.iter() {
        let path = join_path(prefix, name);
        if field.index {
            out.push(IndexSpec::single(path.clone()).unique(field.unique).sparse(field.sparse));
        }
        if let Some(nested) = nested_schema(&field.kind) {
            collect_field_indexes(nested, &path, out);
        }
    }
}

/// Schema plugin, applied in order after the schema is built
pub type Plugin<'a> = &'a dyn Fn(&mut Schema);

/// Create a root schema with [`SCHEMA_OPTIONS`] unless options are given
pub fn create_schema(
    definition: SchemaDefinition,
    options: Option<SchemaOptions>,
    plugins: &[Plugin<'_>],
) -> Schema {
    let mut schema = Schema::new(definition, options.unwrap_or(SCHEMA_OPTIONS));
    for plugin in plugins {
        plugin(&mut schema);
    }
    schema
}

/// Create an embedded schema with [`SUB_SCHEMA_OPTIONS`] unless options are given
///
/// The result never persists an `_id`, whatever options are passed.
pub fn create_sub_schema(
    definition: SchemaDefinition,
    options: Option<SchemaOptions>,
    plugins: &[Plugin<'_>],
) -> Schema {
    let mut schema = Schema::new(definition, options.unwrap_or(SUB_SCHEMA_OPTIONS));
    for plugin in plugins {
        plugin(&mut schema);
    }
    schema.into_embedded()
}
