//! # Stash Core
//!
//! Core library for the stash personal media archive: the ingestion
//! pipeline, the content-addressed store and the pluggable components
//! around them.
//!
//! ## Overview
//!
//! Files arrive either from a one-off directory scan or from a watched
//! directory. Each one is inspected, hashed, merged with any record already
//! stored under the same hash (or stored fresh), then indexed:
//!
//! - **Scanning**: [`scan`] streams candidate files lazily over a channel
//! - **Watching**: [`fs_watch`] debounces filesystem notifications per path
//! - **Importing**: [`import`] runs every file through a bounded worker pool
//! - **Storage**: [`store`] keeps content and metadata sharded by hash
//! - **Search**: [`index`] is a rebuildable view over the store
//! - **Thumbnails**: [`thumbnails`] renders and caches previews, coalescing
//!   identical concurrent requests through [`singleflight`]
//!
//! ## Examples
//!
//! ```no_run
//! use stash_core::{
//!     config::ServiceConfig,
//!     import::ImportOptions,
//!     inspect::InspecterRegistry,
//!     registry::ComponentRegistry,
//!     service::Service,
//! };
//!
//! async fn import_holiday(dir: &str) -> Result<(), Box<dyn std::error::Error>> {
//!     let inspecters = InspecterRegistry::with_defaults();
//!     let service = Service::new(
//!         &ServiceConfig::default(),
//!         &ComponentRegistry::with_defaults(),
//!         inspecters.clone(),
//!     )?;
//!
//!     let opts = ImportOptions::new(dir)
//!         .mime_types(inspecters.mime_types())
//!         .tags(["holiday"]);
//!     let mut errors = service.import(opts);
//!     while let Some(err) = errors.recv().await {
//!         eprintln!("{err}");
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

/// On-disk thumbnail cache
pub mod cache;

/// Service wiring settings and component descriptors
pub mod config;

/// Trailing-edge debouncer
pub mod debounce;

/// Error types and error handling utilities
pub mod error;

/// Exporter abstraction
pub mod export;

/// Watch imports driven by filesystem notifications
pub mod fs_watch;

/// Content identifiers
pub mod hash;

/// Import options, the import pipeline and the worker pool
pub mod import;

/// Search index abstraction and the in-memory index
pub mod index;

/// Mime-specific inspecters and thumbnailers
pub mod inspect;

/// The item record
pub mod item;

/// Component registry used to build a service from configuration
pub mod registry;

/// Directory scanning
pub mod scan;

/// Service facade
pub mod service;

/// Request coalescing
pub mod singleflight;

/// Content-addressed storage
pub mod store;

/// Thumbnail generation
pub mod thumbnails;

pub use error::{MediaError, Result};
pub use item::{Item, ItemType, LatLon};
pub use service::Service;
