//! # degraphmalizer
//!
//! Keeps derived search documents consistent with a graph of relationships between source
//! documents.
//!
//! ## Overview
//!
//! Source documents live in a [`store::DocumentStore`]. A [`config::Configuration`] says, per
//! target index and type, which source documents are accepted, which relationships they
//! contribute to the graph, and which properties of a derived document are computed by
//! walking that graph. Whenever a source document changes, the [`Degraphmalizer`]:
//!
//! - replaces the edges the document owns in the [`graph::GraphStore`]
//! - recomputes its derived documents and those of every document within a bounded number of
//!   hops, so relationship-derived properties never go stale
//! - hands each written or deleted derived document to an [`updater::Updater`], which tells
//!   the search endpoint about it with at-least-once delivery
//!
//! ## Architecture
//!
//! - **[`trees`]**: generic rooted trees, tree visitors and the cycle-safe BFS tree builder
//! - **[`graph`]**: the relationship graph, walk directions and path elements
//! - **[`store`]** / **[`cache`]**: source and derived documents, with a bounded LRU in front
//! - **[`config`]**: type configurations, hooks and the reloadable directory loader
//! - **[`degraphmalizer`]**: the recompute pipeline
//! - **[`updater`]**: per-index change queues and delivery
//! - **[`event`]**: progress events for pipeline runs and configuration reloads
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use degraphmalizer::{
//!     config::{HookRegistry, ReloadingConfiguration, ServiceSettings},
//!     graph::MemoryGraph,
//!     id::DocumentId,
//!     pools::WorkerPools,
//!     store::MemoryStore,
//!     updater::UpdaterManager,
//!     DegraphmalizeAction, Degraphmalizer,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let settings = ServiceSettings::from_file("degraphmalizer.toml")?;
//! let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.put(DocumentId::new("people", "person", "ada", 1), json!({"name": "Ada"}));
//!
//! let pipeline = Degraphmalizer::new(
//!     Arc::new(ReloadingConfiguration::new(
//!         &settings.config_dir,
//!         HookRegistry::with_builtins(),
//!     )?),
//!     store.clone(),
//!     Arc::new(MemoryGraph::new()),
//!     Arc::new(UpdaterManager::new(
//!         settings.updater.clone(),
//!         store,
//!         runtime.handle().clone(),
//!     )),
//!     WorkerPools::new(&settings.pools)?,
//!     settings.pipeline.clone(),
//! );
//!
//! let result = pipeline.degraphmalize(
//!     DegraphmalizeAction::Update,
//!     &DocumentId::new("people", "person", "ada", 1),
//! )?;
//! for recompute in result.recomputes.iter() {
//!     println!("{} at distance {}", recompute.root, recompute.distance);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Features
//!
//! - **default**: the pipeline, the updaters and the directory configuration loader
//! - **service**: configuration hot reload ([`watch`]) through filesystem notifications
//! - **bin**: the `degraphmalizer` CLI (`check`, `watch`, `replay`)

pub mod cache;
pub mod config;
pub mod degraphmalizer;
pub mod error;
pub mod event;
pub mod graph;
pub mod id;
pub mod pools;
pub mod store;
pub mod subgraph;
pub mod trees;
pub mod updater;
#[cfg(feature = "service")]
pub mod watch;

pub use degraphmalizer::{
    ChangeSink, DegraphmalizeAction, DegraphmalizeResult, Degraphmalizer, PipelineStage,
};
pub use error::*;
