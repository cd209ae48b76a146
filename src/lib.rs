// src/lib.rs
//! course-crawler library: walks a hierarchical course catalog API and
//! persists it into SQLite.
//!
//! # Public API
//!
//! The library exposes types organized by concern:
//! - **Error handling**: `AppError`, `FetchError`, `DecodeError`, `StorageError`
//! - **Configuration**: `CommandLineInput`, `CrawlConfig`
//! - **Domain model**: `Course`, `Chapter`, `Subchapter`, `Video`, `RelatedResource`
//! - **API client**: `CatalogApi`, `HttpCatalogClient`, `Endpoint`
//! - **Crawl**: `CatalogPipeline`, `RunSummary`, `ProgressEvent`
//! - **Store**: `CatalogStore`, `SqliteCatalogStore`

pub mod api;
pub mod config;
pub mod constants;
pub mod crawl;
pub mod error;
pub mod error_recovery;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod types;

// --- Error Handling ---
pub use crate::error::{AppError, DecodeError, FetchError, StorageError, TaskError};
pub use crate::types::ValidationError;

// --- Configuration ---
pub use crate::config::{CommandLineInput, CrawlConfig};
pub use crate::error_recovery::RetryPolicy;

// --- Domain Model ---
pub use crate::model::{
    Chapter, Course, Entity, MediaReference, RelatedResource, ResourceType, Subchapter, Video,
};

// --- Domain Types ---
pub use crate::types::{ApiBaseUrl, ApiToken, EntityKind, ResourceId};

// --- API Client ---
pub use crate::api::{CatalogApi, Endpoint, HttpCatalogClient};

// --- Crawl ---
pub use crate::crawl::{Outcome, ProgressEvent, Task, TaskKind};
pub use crate::pipeline::{CatalogPipeline, PipelineSettings, RunStatus, RunSummary};

// --- Store ---
pub use crate::store::{CatalogExport, CatalogStore, SqliteCatalogStore, StoreStats};
