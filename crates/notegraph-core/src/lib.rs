//! # notegraph-core
//!
//! Core types, traits, and abstractions for notegraph.
//!
//! This crate provides the extraction data model, the error taxonomy, shared
//! defaults, and the backend traits that the other notegraph crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod text;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use text::{spans_overlap, SourceText};
pub use traits::*;
