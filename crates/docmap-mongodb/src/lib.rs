//! Connection, model registry and maintenance helpers for MongoDB
//!
//! This crate manages the lifecycle around a document database rather than
//! the documents themselves.
//!
//! # Features
//! - Connection string parsing and building
//! - Default and additional connections with ready-state tracking
//! - Per-connection model registry with collection name derivation
//! - Schema presets for root and embedded schemas
//! - Clearing collections, syncing indexes and dropping databases
//! - An in-memory backend for tests

pub mod backend;
pub mod config;
pub mod connection;
pub mod global;
pub mod maintenance;
pub mod manager;
pub mod memory;
pub mod model;
pub mod mongo;
pub mod registry;
pub mod schema;
pub mod uri;
pub mod validation;

pub use backend::{disable_debug, enable_debug, is_debug, Backend, Connector};
pub use config::{ConnectConfig, PoolConfig};
pub use connection::{
    is_connected, is_connection, is_model, is_schema, Connection, ModelOptions, ReadyState,
};
pub use docmap_common::{DocmapError, Result};
pub use manager::ConnectionManager;
pub use memory::{MemoryConnector, MemoryServer};
pub use model::{to_collection_name, Model, ModelRef};
pub use mongo::{MongoBackend, MongoConnector};
pub use registry::{Arg, ModelArgs, ModelRegistry};
pub use schema::{
    create_schema, create_sub_schema, FieldDef, FieldType, IndexSpec, Plugin, Schema,
    SchemaDefinition, SchemaOptions, SCHEMA_OPTIONS, SUB_SCHEMA_OPTIONS,
};
pub use uri::{build_uri, parse_uri, parse_uri_with, BuildOptions, HostAddr, ParsedUri};
pub use validation::ValidatedCollectionName;
