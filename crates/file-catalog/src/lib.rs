//! Client for the file catalog REST API.
//!
//! This crate provides:
//! - A blocking HTTP client for listing, creating, reading, updating,
//!   replacing and deleting file metadata records
//! - Transparent `uid` to `mongo_id` resolution backed by an in-memory cache
//! - Etag tracking for conditional updates
//! - Classification of server error responses into typed errors
//!
//! ## Usage
//!
//! ```no_run
//! use file_catalog::{CatalogClient, CatalogClientConfig, FileCatalog, FileRef};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), file_catalog::CatalogClientError> {
//! let config = CatalogClientConfig {
//!     port: Some(8888),
//!     ..CatalogClientConfig::new("http://localhost")
//! };
//! let mut client = CatalogClient::new(config)?;
//!
//! let record = client.get(&FileRef::uid("my-uid"))?;
//! let patch = json!({ "checksum": { "sha512": "..." } });
//! client.update(&FileRef::uid("my-uid"), patch.as_object().unwrap(), false)?;
//! # let _ = record;
//! # Ok(())
//! # }
//! ```

mod cache;
mod client;
mod config;
mod error;
mod types;

pub use cache::{CacheError, IdentifierCache};
pub use client::{CatalogClient, FileCatalog};
pub use config::{CatalogClientConfig, ConfigError};
pub use error::{CatalogClientError, ErrorKind, ServerError, classify};
pub use types::{FileRef, Metadata};
