//! # Configuration hot reload
//!
//! [`ConfigurationWatcher`] watches a configuration directory and reloads the
//! [`ReloadingConfiguration`] behind it whenever a type file is created, modified or removed.
//! Every reload attempt is reported on the event channel:
//!
//! - [`ConfigurationEvent::Reloaded`] with the target indices of the new snapshot
//! - [`ConfigurationEvent::Rejected`] with the load error; the previous snapshot stays live
//!
//! Filesystem events are debounced, so an editor saving several files at once causes one
//! reload.
//!
//! ```rust,no_run
//! use degraphmalizer::{
//!     config::{HookRegistry, ReloadingConfiguration},
//!     event::Event,
//!     watch::ConfigurationWatcher,
//! };
//! use std::{sync::{mpsc::channel, Arc}};
//!
//! let provider = Arc::new(ReloadingConfiguration::new("conf", HookRegistry::with_builtins())?);
//! let (tx, rx) = channel::<Event>();
//! let _watcher = ConfigurationWatcher::new(provider, tx)?;
//! for event in rx {
//!     println!("{event}");
//! }
//! # Ok::<(), degraphmalizer::DegraphmalizerError>(())
//! ```
//!
//! Requires the `service` feature.

use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher},
    DebounceEventResult, Debouncer, FileIdMap,
};
use std::{
    path::Path,
    sync::{mpsc::Sender, Arc},
    time::Duration,
};

use crate::{
    config::{ConfigurationProvider, ReloadingConfiguration},
    error::DegraphmalizerError,
    event::{ConfigurationEvent, Event},
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

type ConfigDebouncer = Debouncer<RecommendedWatcher, FileIdMap>;

/// Keeps a [`ReloadingConfiguration`] in sync with its directory until dropped.
pub struct ConfigurationWatcher {
    provider: Arc<ReloadingConfiguration>,
    debouncer: ConfigDebouncer,
}

fn is_type_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false);
    !hidden && path.extension().map(|ext| ext == "toml").unwrap_or(false)
}

impl ConfigurationWatcher {
    pub fn new(
        provider: Arc<ReloadingConfiguration>,
        event_tx: Sender<Event>,
    ) -> Result<Self, DegraphmalizerError> {
        Self::with_debounce(provider, event_tx, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(
        provider: Arc<ReloadingConfiguration>,
        event_tx: Sender<Event>,
        debounce: Duration,
    ) -> Result<Self, DegraphmalizerError> {
        let reloader = provider.clone();
        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let relevant = events.iter().any(|event| match event.event.kind {
                        EventKind::Create(_) | EventKind::Modify(_) => {
                            event.event.paths.iter().any(|p| is_type_file(p))
                        }
                        // a removed index directory has no extension
                        EventKind::Remove(_) => true,
                        _ => false,
                    });
                    if !relevant {
                        return;
                    }
                    tracing::info!("[ConfigurationWatcher] configuration changed, reloading");
                    let event = match reloader.reload() {
                        Ok(cfg) => ConfigurationEvent::Reloaded(cfg.index_names()),
                        Err(e) => ConfigurationEvent::Rejected(e),
                    };
                    if let Err(e) = event_tx.send(Event::Configuration(event)) {
                        tracing::warn!("[ConfigurationWatcher] event receiver dropped: {e}");
                    }
                }
                Err(errors) => {
                    tracing::error!("Notify debouncer returned errors: {:?}", errors);
                }
            }
        })?;
        debouncer
            .watcher()
            .watch(provider.dir(), RecursiveMode::Recursive)?;
        tracing::debug!("watching {:?} for configuration changes", provider.dir());

        Ok(ConfigurationWatcher {
            provider,
            debouncer,
        })
    }

    pub fn provider(&self) -> &Arc<ReloadingConfiguration> {
        &self.provider
    }

    /// Current snapshot of the watched configuration.
    pub fn configuration(&self) -> Arc<crate::config::Configuration> {
        self.provider.configuration()
    }

    /// Stops watching. Dropping the watcher does the same.
    pub fn unwatch(mut self) -> Result<(), DegraphmalizerError> {
        let dir = self.provider.dir().to_path_buf();
        self.debouncer.watcher().unwatch(&dir)?;
        Ok(())
    }
}
