//! gridkit core - shared types and collaborator traits for the list view
//!
//! This crate provides the fundamental types that the list state machine
//! is built on:
//!
//! - `Value`, `RecordId`, `RecordData` - record data as exchanged with the store
//! - `Domain`, `OrderSpec` - query descriptions
//! - `ViewConfig`, `ColumnSpec` - the compiled list view configuration
//! - `FieldRenderer` - per-column formatter/validator capability
//! - `RemoteStore` - trait for the remote collection store
//! - `KeyValueStore` - trait for small persisted preferences

mod domain;
mod error;
pub mod logging;
mod remote;
mod renderer;
mod storage;
mod types;
mod view;

pub use domain::*;
pub use error::*;
pub use remote::*;
pub use renderer::*;
pub use storage::*;
pub use types::*;
pub use view::*;
