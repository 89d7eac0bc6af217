#![forbid(unsafe_code)]

//! Read-through caching for YouTube catalog metadata.
//!
//! Three layers make up the crate:
//!
//! - [`store::MetadataStore`]: a single-file SQLite store holding channel
//!   and video rows.
//! - [`client::CatalogClient`]: a typed client for the remote catalog API,
//!   handling pagination cursors and batched duration lookups.
//! - [`catalog::CachedCatalog`]: the facade that queries the store first and
//!   fills it from the remote on miss.
//!
//! Configuration (API key, database path, API base URL) is resolved from the
//! process environment or a `.env` file; see [`config`].

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod store;

pub use catalog::{CachedCatalog, CatalogSource};
pub use client::{CatalogClient, TimeBound, VideoSummary};
pub use config::{CatalogSettings, SettingsOverrides, load_settings, resolve_settings};
pub use error::{CatalogError, Result};
pub use store::{ChannelRecord, MetadataStore, VideoRecord};
