//! # Updater - at-least-once change delivery
//!
//! One [`Updater`] per target index owns a tokio task that drains that index's
//! [`ChangeQueue`] and tells the search endpoint about every derived document that was written
//! (`GET`) or deleted (`DELETE`):
//!
//! ```text
//! {scheme}://{host}:{port}/{index or alias}/{type}/{id}/{version}
//! ```
//!
//! Only `200 OK` counts as delivered. A failed delivery is requeued for that one target with a
//! linear backoff of `retries * retry_delay`; after `max_retries` failures the change is
//! appended to `{log_path}/{index}-error.log` and dropped from the queue. Such a log can be fed
//! back with [`Updater::replay`].
//!
//! Deliveries to one index leave in queue order, except that a retried change waits for its
//! backoff while later changes go ahead.

mod change;
mod manager;
mod queue;

pub use change::{Change, ChangeAction};
pub use manager::UpdaterManager;
pub use queue::{
    append_changes, error_log_path, overflow_path, read_changes, ChangeQueue,
};

use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use std::{path::Path, sync::Arc};
use tokio::{
    runtime::Handle,
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    task::JoinHandle,
};
use url::Url;

use crate::{config::UpdaterSettings, error::DegraphmalizerError, store::DocumentStore};

#[derive(Debug)]
enum Command {
    Add(Change),
    Start,
    Stop,
    Flush,
    QueueSize(oneshot::Sender<usize>),
    Shutdown,
}

/// Handle to the delivery task of one target index.
pub struct Updater {
    index: String,
    commands: UnboundedSender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Updater {
    /// Starts the delivery task for `index` on `runtime`. Delivery is active right away.
    pub fn spawn(
        index: impl Into<String>,
        settings: UpdaterSettings,
        aliases: Arc<dyn DocumentStore>,
        runtime: &Handle,
    ) -> Result<Self, DegraphmalizerError> {
        let index = index.into();
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .read_timeout(settings.read_timeout())
            .build()?;
        let base = settings.base_url()?;
        let (commands, receiver) = unbounded_channel();

        tracing::info!(
            "updater for index {index} sends to {base}, retry delay {}ms, at most {} retries",
            settings.retry_delay_ms,
            settings.max_retries
        );
        let worker = Worker {
            index: index.clone(),
            settings,
            client,
            base,
            aliases,
        };
        let handle = runtime.spawn(worker.run(receiver));
        Ok(Updater {
            index,
            commands,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn send(&self, command: Command) -> Result<(), DegraphmalizerError> {
        self.commands.send(command).map_err(|_| {
            DegraphmalizerError::Interrupted(format!("updater for {} has stopped", self.index))
        })
    }

    pub fn add(&self, change: Change) -> Result<(), DegraphmalizerError> {
        tracing::trace!("{} received {change}", self.index);
        self.send(Command::Add(change))
    }

    /// Resumes delivery.
    pub fn start(&self) -> Result<(), DegraphmalizerError> {
        self.send(Command::Start)
    }

    /// Pauses delivery. Queued and newly added changes are kept.
    pub fn stop(&self) -> Result<(), DegraphmalizerError> {
        self.send(Command::Stop)
    }

    /// Discards every pending change.
    pub fn flush(&self) -> Result<(), DegraphmalizerError> {
        self.send(Command::Flush)
    }

    /// Pending changes, in memory and overflowed.
    pub async fn queue_size(&self) -> Result<usize, DegraphmalizerError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::QueueSize(tx))?;
        rx.await.map_err(|_| {
            DegraphmalizerError::Interrupted(format!("updater for {} has stopped", self.index))
        })
    }

    /// Stops the task after persisting what is still queued to the overflow file.
    pub async fn shutdown(&self) -> Result<(), DegraphmalizerError> {
        // already gone is fine: the task persisted on its way out
        let _ = self.send(Command::Shutdown);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            handle.await.map_err(|e| {
                DegraphmalizerError::Interrupted(format!(
                    "updater for {} did not stop cleanly: {e}",
                    self.index
                ))
            })?;
        }
        Ok(())
    }

    /// Queues every change of an error log again, with retry counts reset. Returns how many.
    pub fn replay(&self, path: &Path) -> Result<usize, DegraphmalizerError> {
        let changes = read_changes(path)?;
        let count = changes.len();
        for change in changes {
            self.add(change)?;
        }
        tracing::info!("replayed {count} change(s) from {path:?} into {}", self.index);
        Ok(count)
    }
}

/// `base/{target}/{type}/{id}/{version}` with every segment percent-encoded.
pub fn change_url(base: &Url, target: &str, change: &Change) -> Result<Url, DegraphmalizerError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| DegraphmalizerError::Configuration(format!("{base} cannot carry a path")))?
        .clear()
        .push(target)
        .push(&change.doc_type)
        .push(&change.id)
        .push(&change.version.to_string());
    Ok(url)
}

struct Worker {
    index: String,
    settings: UpdaterSettings,
    client: Client,
    base: Url,
    aliases: Arc<dyn DocumentStore>,
}

impl Worker {
    async fn run(self, mut commands: UnboundedReceiver<Command>) {
        let overflow = overflow_path(&self.settings.log_path, &self.index);
        let mut queue = match ChangeQueue::open(overflow.clone(), self.settings.queue_limit) {
            Ok(queue) => queue,
            Err(e) => {
                tracing::error!(
                    "updater for {} cannot start, overflow file {overflow:?} unreadable: {e}",
                    self.index
                );
                return;
            }
        };
        let mut sending = true;

        loop {
            if let Err(e) = queue.refill() {
                tracing::error!("updater for {} could not reload overflow: {e}", self.index);
            }
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Add(change)) => {
                        if let Err(e) = queue.push(change) {
                            tracing::error!("updater for {} lost a change: {e}", self.index);
                        }
                    }
                    Some(Command::Start) => sending = true,
                    Some(Command::Stop) => sending = false,
                    Some(Command::Flush) => match queue.clear() {
                        Ok(n) => tracing::info!("flushed {n} change(s) for {}", self.index),
                        Err(e) => tracing::error!("flush of {} failed: {e}", self.index),
                    },
                    Some(Command::QueueSize(reply)) => {
                        let _ = reply.send(queue.len());
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(change) = queue.next(), if sending => {
                    self.perform(&mut queue, change).await;
                }
                _ = tokio::time::sleep(self.settings.pause_interval()), if !sending => {
                    tracing::debug!(
                        "updater for {} paused, {} change(s) queued",
                        self.index,
                        queue.len()
                    );
                }
            }
        }

        match queue.persist() {
            Ok(0) => {}
            Ok(n) => tracing::info!("persisted {n} pending change(s) to {overflow:?}"),
            Err(e) => tracing::error!("could not persist pending changes of {}: {e}", self.index),
        }
        tracing::info!("updater stopped for index {}", self.index);
    }

    fn targets(&self) -> Vec<String> {
        let mut targets = vec![self.index.clone()];
        match self.aliases.list_aliases(&self.index) {
            Ok(aliases) => targets.extend(aliases),
            Err(e) => tracing::warn!("could not list aliases of {}: {e}", self.index),
        }
        targets
    }

    async fn perform(&self, queue: &mut ChangeQueue, change: Change) {
        let targets = match &change.target {
            Some(target) => vec![target.clone()],
            None => self.targets(),
        };
        for target in targets {
            match self.deliver(&change, &target).await {
                Ok(()) => tracing::debug!("change performed: {target} : {change}"),
                Err(e) => {
                    tracing::warn!("delivery of {change} to {target} failed: {e}");
                    self.retry(queue, &change, &target);
                }
            }
        }
    }

    async fn deliver(&self, change: &Change, target: &str) -> Result<(), DegraphmalizerError> {
        let url = change_url(&self.base, target, change)?;
        let response = self
            .client
            .request(change.action.method(), url.clone())
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(DegraphmalizerError::Delivery(format!(
                "{} {url} answered {}",
                change.action.method(),
                response.status()
            )));
        }
        Ok(())
    }

    fn retry(&self, queue: &mut ChangeQueue, change: &Change, target: &str) {
        let next = change.retried(target);
        if next.retries < self.settings.max_retries {
            let delay = self.settings.retry_delay() * next.retries;
            tracing::debug!("retrying {next} on {target} in {delay:?}");
            queue.push_delayed(next, delay);
            return;
        }
        let log = error_log_path(&self.settings.log_path, &self.index);
        tracing::error!(
            "giving up on {next} for {target} after {} attempt(s), writing to {log:?}",
            next.retries
        );
        if let Err(e) = append_changes(&log, [&next]) {
            tracing::error!("could not write error log {log:?}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_encode_each_segment() {
        let base = Url::parse("http://localhost:9200/").unwrap();
        let change = Change::delete("a type", "x/y", 3);
        let url = change_url(&base, "people-v2", &change).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9200/people-v2/a%20type/x%2Fy/3");
    }
}
