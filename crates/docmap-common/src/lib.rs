//! Common utilities for docmap
//!
//! This crate provides the error type shared by the docmap crates.

pub mod error;

pub use error::{DocmapError, Result};
