use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};
use tokio::runtime::Handle;

use super::{Change, Updater};
use crate::{
    config::UpdaterSettings, degraphmalizer::ChangeSink, error::DegraphmalizerError,
    store::DocumentStore,
};

/// One [`Updater`] per target index, created the first time a change for that index arrives.
pub struct UpdaterManager {
    settings: UpdaterSettings,
    aliases: Arc<dyn DocumentStore>,
    runtime: Handle,
    updaters: RwLock<BTreeMap<String, Arc<Updater>>>,
}

impl UpdaterManager {
    /// Updaters run on `runtime`; the manager itself may be used from any thread.
    pub fn new(
        settings: UpdaterSettings,
        aliases: Arc<dyn DocumentStore>,
        runtime: Handle,
    ) -> Self {
        UpdaterManager {
            settings,
            aliases,
            runtime,
            updaters: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn settings(&self) -> &UpdaterSettings {
        &self.settings
    }

    pub fn updater(&self, index: &str) -> Result<Arc<Updater>, DegraphmalizerError> {
        if let Some(updater) = self.updaters.read().get(index) {
            return Ok(updater.clone());
        }
        let mut updaters = self.updaters.write();
        if let Some(updater) = updaters.get(index) {
            return Ok(updater.clone());
        }
        let updater = Arc::new(Updater::spawn(
            index,
            self.settings.clone(),
            self.aliases.clone(),
            &self.runtime,
        )?);
        updaters.insert(index.to_string(), updater.clone());
        Ok(updater)
    }

    pub fn indices(&self) -> Vec<String> {
        self.updaters.read().keys().cloned().collect()
    }

    /// Sum of every updater's pending changes.
    pub async fn queue_size(&self) -> Result<usize, DegraphmalizerError> {
        let updaters: Vec<Arc<Updater>> = self.updaters.read().values().cloned().collect();
        let mut total = 0;
        for updater in updaters {
            total += updater.queue_size().await?;
        }
        Ok(total)
    }

    pub async fn shutdown(&self) -> Result<(), DegraphmalizerError> {
        let updaters: Vec<Arc<Updater>> =
            std::mem::take(&mut *self.updaters.write()).into_values().collect();
        for updater in updaters {
            updater.shutdown().await?;
        }
        Ok(())
    }
}

impl ChangeSink for UpdaterManager {
    fn add(&self, index: &str, change: Change) -> Result<(), DegraphmalizerError> {
        self.updater(index)?.add(change)
    }
}
