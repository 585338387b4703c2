//! # Configuration
//!
//! Two layers live here:
//!
//! - [`ServiceSettings`]: process-wide knobs (updater endpoint and retry policy, worker pool
//!   sizes, pipeline bounds), read from one TOML file with a default for every field.
//! - [`Configuration`]: the index configurations, one [`TypeConfig`] per
//!   `<config_dir>/<target index>/<target type>.toml` file. Hook names in those files resolve
//!   against a [`HookRegistry`].
//!
//! Readers never see a half-loaded configuration. A [`ConfigurationProvider`] hands out
//! `Arc<Configuration>` snapshots; [`ReloadingConfiguration::reload`] builds a complete new
//! snapshot and swaps the pointer, or keeps the old one when the new files do not load.
//!
//! ```rust,no_run
//! use degraphmalizer::config::{ConfigurationProvider, HookRegistry, ReloadingConfiguration};
//!
//! let provider =
//!     ReloadingConfiguration::new("/etc/degraphmalizer/conf", HookRegistry::with_builtins())?;
//! for index in provider.configuration().index_names() {
//!     println!("{index}");
//! }
//! # Ok::<(), degraphmalizer::DegraphmalizerError>(())
//! ```

mod hooks;
mod loader;
mod model;

pub use hooks::{
    CollectReducer, CountReducer, DocumentFilter, DocumentTransformer, DocumentsReducer, EdgeRule,
    HookRegistry, IdsReducer, Reducer, SubgraphExtractor, COLLECT_PREFIX,
};
pub use loader::{load_configuration, type_files, PropertyFile, TypeFile, WalkFile};
pub use model::{
    configs_for, Configuration, IndexConfig, PropertyConfig, TypeConfig, WalkConfig,
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{cache::DEFAULT_CACHE_CAPACITY, error::DegraphmalizerError};

pub const MIN_POOL_THREADS: usize = 2;
pub const MAX_POOL_THREADS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterSettings {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub retry_delay_ms: u64,
    pub max_retries: u32,
    pub queue_limit: usize,
    /// Directory receiving `{index}-error.log` and `{index}-overflow.log`.
    pub log_path: PathBuf,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// How long a stopped worker sleeps between checks for a restart.
    pub pause_interval_ms: u64,
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        UpdaterSettings {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 9200,
            retry_delay_ms: 1000,
            max_retries: 10,
            queue_limit: 100_000,
            log_path: PathBuf::from("."),
            connect_timeout_ms: 50_000,
            read_timeout_ms: 50_000,
            pause_interval_ms: 5_000,
        }
    }
}

impl UpdaterSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn pause_interval(&self) -> Duration {
        Duration::from_millis(self.pause_interval_ms)
    }

    /// `scheme://host:port/`, the base every document URL is built on.
    pub fn base_url(&self) -> Result<url::Url, DegraphmalizerError> {
        Ok(url::Url::parse(&format!(
            "{}://{}:{}/",
            self.scheme, self.host, self.port
        ))?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub recompute_threads: usize,
    pub fetch_threads: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            recompute_threads: 8,
            fetch_threads: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Propagation hop bound: a recompute at this distance fans out no further.
    pub max_distance: usize,
    /// Walk depth used when a walk does not set its own `max_depth`.
    pub max_walk_depth: usize,
    pub cache_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            max_distance: 3,
            max_walk_depth: 16,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub config_dir: PathBuf,
    pub updater: UpdaterSettings,
    pub pools: PoolSettings,
    pub pipeline: PipelineSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            config_dir: PathBuf::from("conf"),
            updater: UpdaterSettings::default(),
            pools: PoolSettings::default(),
            pipeline: PipelineSettings::default(),
        }
    }
}

impl ServiceSettings {
    pub fn from_toml_str(text: &str) -> Result<Self, DegraphmalizerError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DegraphmalizerError> {
        tracing::debug!("Reading service settings from {:?}", path.as_ref());
        ServiceSettings::from_toml_str(&read_to_string(path)?)
    }
}

/// Source of configuration snapshots for the pipeline.
pub trait ConfigurationProvider: Send + Sync {
    fn configuration(&self) -> Arc<Configuration>;
}

/// A snapshot that never changes. Used by embedders that build configuration in code.
#[derive(Debug, Clone)]
pub struct StaticConfiguration(Arc<Configuration>);

impl StaticConfiguration {
    pub fn new(configuration: Configuration) -> Self {
        StaticConfiguration(Arc::new(configuration))
    }
}

impl ConfigurationProvider for StaticConfiguration {
    fn configuration(&self) -> Arc<Configuration> {
        self.0.clone()
    }
}

/// Configuration loaded from a directory that can be reloaded while the pipeline runs.
#[derive(Debug)]
pub struct ReloadingConfiguration {
    dir: PathBuf,
    registry: HookRegistry,
    current: RwLock<Arc<Configuration>>,
}

impl ReloadingConfiguration {
    /// Loads the initial snapshot. Failing here is fatal to startup.
    pub fn new<P: Into<PathBuf>>(
        dir: P,
        registry: HookRegistry,
    ) -> Result<Self, DegraphmalizerError> {
        let dir = dir.into();
        let initial = load_configuration(&dir, &registry)?;
        Ok(ReloadingConfiguration {
            dir,
            registry,
            current: RwLock::new(Arc::new(initial)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Builds a new snapshot and swaps it in. On failure the previous snapshot stays live and
    /// the error is returned for reporting.
    pub fn reload(&self) -> Result<Arc<Configuration>, DegraphmalizerError> {
        match load_configuration(&self.dir, &self.registry) {
            Ok(next) => {
                let next = Arc::new(next);
                *self.current.write() = next.clone();
                tracing::info!(
                    "configuration reloaded from {:?}: {:?}",
                    self.dir,
                    next.index_names()
                );
                Ok(next)
            }
            Err(e) => {
                tracing::warn!(
                    "configuration reload from {:?} rejected, keeping previous snapshot: {e}",
                    self.dir
                );
                Err(e)
            }
        }
    }
}

impl ConfigurationProvider for ReloadingConfiguration {
    fn configuration(&self) -> Arc<Configuration> {
        self.current.read().clone()
    }
}
