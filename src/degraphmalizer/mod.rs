//! # Degraphmalizer - the recompute pipeline
//!
//! One [`Degraphmalizer::degraphmalize`] call takes a changed (or deleted) source document
//! through the whole pipeline:
//!
//! 1. fetch the document and run every matching [`TypeConfig`] filter
//! 2. extract the accepted types' subgraphs and commit them as one edge set
//! 3. recompute the document's own derived documents: walk the graph, resolve the walked
//!    documents through the [`DocumentCache`], reduce each walk into properties and write
//! 4. hand a [`Change`] per written document to the [`ChangeSink`]
//! 5. propagate: recompute every document within `max_distance` hops, level by level
//!
//! ## Threading
//!
//! Whole runs are serialized: [`Degraphmalizer::degraphmalize`] runs on the caller's thread
//! under a run guard, and [`Degraphmalizer::submit`] queues onto one dedicated `degraphmalize`
//! thread that takes the same guard. Each propagation level fans out over the `recompute` pool
//! of [`WorkerPools`], and every walk resolves its documents with [`crate::trees::pmap`] on
//! the `fetch` pool.
//!
//! A run that stops early still yields a [`DegraphmalizeResult`], at `FAILED` and carrying the
//! cause in `error`.
//!
//! A run uses the configuration snapshot current when it started, even if a reload lands
//! while it is in flight.
//!
//! ```rust,no_run
//! use degraphmalizer::{
//!     config::{Configuration, ServiceSettings, StaticConfiguration},
//!     graph::MemoryGraph, id::DocumentId, pools::WorkerPools, store::MemoryStore,
//!     updater::UpdaterManager,
//!     Degraphmalizer, DegraphmalizeAction,
//! };
//! use std::sync::Arc;
//!
//! let settings = ServiceSettings::default();
//! let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
//! let store = Arc::new(MemoryStore::new());
//! let updaters = Arc::new(UpdaterManager::new(
//!     settings.updater.clone(),
//!     store.clone(),
//!     runtime.handle().clone(),
//! ));
//! let pipeline = Degraphmalizer::new(
//!     Arc::new(StaticConfiguration::new(Configuration::default())),
//!     store,
//!     Arc::new(MemoryGraph::new()),
//!     updaters,
//!     WorkerPools::new(&settings.pools)?,
//!     settings.pipeline.clone(),
//! );
//! let result = pipeline.degraphmalize(
//!     DegraphmalizeAction::Update,
//!     &DocumentId::new("people", "person", "ada", 1),
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod recompute;
mod request;

use recompute::{outcome_of, Derivation};

pub use request::{
    DegraphmalizeAction, DegraphmalizeResult, PipelineStage, RecomputeOutcome, RecomputeRequest,
    RecomputeResult,
};

use parking_lot::Mutex;
use std::{
    collections::{BTreeSet, HashSet},
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Weak,
    },
};

use crate::{
    cache::DocumentCache,
    config::{configs_for, Configuration, ConfigurationProvider, PipelineSettings, TypeConfig},
    error::DegraphmalizerError,
    event::{DegraphmalizeEvent, Event},
    graph::GraphStore,
    id::{DocumentId, DocumentKey},
    pools::WorkerPools,
    store::DocumentStore,
    subgraph::Subgraph,
    updater::Change,
};

/// Where the pipeline hands completed writes and deletes for delivery.
pub trait ChangeSink: Send + Sync {
    /// Queues `change` for the updater of `index`.
    fn add(&self, index: &str, change: Change) -> Result<(), DegraphmalizerError>;
}

pub struct Degraphmalizer {
    configuration: Arc<dyn ConfigurationProvider>,
    documents: Arc<dyn DocumentStore>,
    graph: Arc<dyn GraphStore>,
    cache: Arc<DocumentCache>,
    changes: Arc<dyn ChangeSink>,
    pools: WorkerPools,
    settings: PipelineSettings,
    /// Held for the whole of every run.
    serial: Mutex<()>,
    /// Feeds the `degraphmalize` thread, started by the first [`Degraphmalizer::submit`].
    submissions: Mutex<Option<Sender<Submission>>>,
}

struct Submission {
    action: DegraphmalizeAction,
    id: DocumentId,
    events: Sender<Event>,
}

impl Degraphmalizer {
    pub fn new(
        configuration: Arc<dyn ConfigurationProvider>,
        documents: Arc<dyn DocumentStore>,
        graph: Arc<dyn GraphStore>,
        changes: Arc<dyn ChangeSink>,
        pools: WorkerPools,
        settings: PipelineSettings,
    ) -> Self {
        let cache = Arc::new(DocumentCache::new(documents.clone(), settings.cache_capacity));
        Degraphmalizer {
            configuration,
            documents,
            graph,
            cache,
            changes,
            pools,
            settings,
            serial: Mutex::new(()),
            submissions: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn configuration(&self) -> Arc<Configuration> {
        self.configuration.configuration()
    }

    /// Runs the pipeline for one document and waits for it. `Err` carries the failure cause;
    /// use [`Degraphmalizer::process`] to also see how far the run got.
    pub fn degraphmalize(
        &self,
        action: DegraphmalizeAction,
        id: &DocumentId,
    ) -> Result<DegraphmalizeResult, DegraphmalizerError> {
        self.process(action, id).into_result()
    }

    /// Runs the pipeline for one document once no other run is in flight. The result ends at
    /// `DONE`, or at `FAILED` with `error` set.
    pub fn process(&self, action: DegraphmalizeAction, id: &DocumentId) -> DegraphmalizeResult {
        let _serial = self.serial.lock();
        self.run(action, id)
    }

    /// Queues a run behind every earlier submission and returns immediately. Progress is
    /// reported on `events` as [`DegraphmalizeEvent`]s.
    pub fn submit(
        self: &Arc<Self>,
        action: DegraphmalizeAction,
        id: DocumentId,
        events: Sender<Event>,
    ) -> Result<(), DegraphmalizerError> {
        let submission = Submission { action, id, events };
        let mut queue = self.submissions.lock();
        let submission = match queue.as_ref() {
            Some(tx) => match tx.send(submission) {
                Ok(()) => return Ok(()),
                // the worker is gone; start a new one below
                Err(mpsc::SendError(submission)) => submission,
            },
            None => submission,
        };
        let (tx, rx) = mpsc::channel();
        let pipeline = Arc::downgrade(self);
        std::thread::Builder::new()
            .name("degraphmalize".to_string())
            .spawn(move || serve_submissions(pipeline, rx))?;
        tx.send(submission).map_err(|_| {
            DegraphmalizerError::TaskFailed("degraphmalize worker exited".to_string())
        })?;
        *queue = Some(tx);
        Ok(())
    }

    /// The requests a recompute at `request.distance` fans out to, against the current
    /// configuration. Empty once the hop bound is reached.
    pub fn propagate(
        &self,
        request: &RecomputeRequest,
    ) -> Result<Vec<RecomputeRequest>, DegraphmalizerError> {
        let cfg = self.configuration.configuration();
        self.plan(&cfg, &request.root.key(), request.distance)
    }

    fn run(&self, action: DegraphmalizeAction, id: &DocumentId) -> DegraphmalizeResult {
        let cfg = self.configuration.configuration();
        let mut result = DegraphmalizeResult::new(id.clone(), action);
        tracing::debug!("degraphmalize {action} {id}");

        let outcome = match action {
            DegraphmalizeAction::Update => self.run_update(&cfg, id, &mut result),
            DegraphmalizeAction::Delete => self.run_delete(&cfg, id, &mut result),
        };
        match outcome {
            Ok(()) => {
                tracing::info!(
                    "degraphmalized {action} {}: {} recompute(s), {} failed",
                    result.id,
                    result.recomputes.len(),
                    result.failures().count()
                );
            }
            Err(e) => {
                tracing::error!("degraphmalize {action} {id} failed at {}: {e}", result.stage);
                result.fail(e);
            }
        }
        result
    }

    fn run_update(
        &self,
        cfg: &Configuration,
        id: &DocumentId,
        result: &mut DegraphmalizeResult,
    ) -> Result<(), DegraphmalizerError> {
        let key = id.key();
        self.cache.invalidate(&key);
        let document = self
            .documents
            .get(id)?
            .ok_or_else(|| DegraphmalizerError::SourceMissing(id.to_string()))?;
        result.id = document.id.clone();

        let mut accepted: Vec<Arc<TypeConfig>> = Vec::new();
        for config in configs_for(cfg, &key.index, Some(&key.doc_type)) {
            if config.filter(&document.source)? {
                accepted.push(config);
            } else {
                tracing::debug!(
                    "{} rejected by {}/{} filter",
                    document.id,
                    config.target_index,
                    config.target_type
                );
            }
        }
        result.stage.advance(PipelineStage::Filtered)?;
        if accepted.is_empty() {
            tracing::debug!("no type configuration accepts {}", document.id);
            return result.stage.advance(PipelineStage::Done);
        }

        let mut subgraph = Subgraph::new();
        for config in accepted.iter() {
            subgraph.merge(config.extract(Some(&document))?);
        }
        result.edges = subgraph.edges().len();
        result.stage.advance(PipelineStage::Extracted)?;

        let former = self.graph.neighbors(&key)?;
        self.graph.commit_subgraph(&document.id, subgraph)?;
        result.stage.advance(PipelineStage::Committed)?;

        let own: Vec<RecomputeRequest> = accepted
            .into_iter()
            .map(|config| RecomputeRequest::new(document.id.clone(), config, 0))
            .collect();
        let mut seen: HashSet<(DocumentKey, String)> =
            own.iter().map(|r| (r.root.key(), r.target())).collect();
        let derived = self.derive_all(&own);
        result.stage.advance(PipelineStage::Walked)?;
        result.recomputes.extend(self.write_all(&own, derived));
        result.stage.advance(PipelineStage::Written)?;

        // documents this commit disconnected lost part of their neighborhood too
        let mut next = self.plan(cfg, &key, 0)?;
        if self.settings.max_distance > 0 {
            next.extend(self.requests_for(cfg, &former, 1)?);
        }
        self.propagate_levels(cfg, next, &mut seen, result)?;
        result.stage.advance(PipelineStage::Propagated)?;
        result.stage.advance(PipelineStage::Done)
    }

    fn run_delete(
        &self,
        cfg: &Configuration,
        id: &DocumentId,
        result: &mut DegraphmalizeResult,
    ) -> Result<(), DegraphmalizerError> {
        let key = id.key();
        self.cache.invalidate(&key);
        result.stage.advance(PipelineStage::Filtered)?;
        result.stage.advance(PipelineStage::Extracted)?;

        let former = self.graph.remove_document(&key)?;
        result.stage.advance(PipelineStage::Committed)?;
        result.stage.advance(PipelineStage::Walked)?;

        let mut seen = HashSet::new();
        for config in configs_for(cfg, &key.index, Some(&key.doc_type)) {
            let request = RecomputeRequest::new(id.clone(), config, 0);
            seen.insert((key.clone(), request.target()));
            let outcome = match self.delete_derived(&request) {
                Ok(deleted) => RecomputeOutcome::Deleted { deleted },
                Err(e) => {
                    tracing::warn!("could not delete derived document for {request}: {e}");
                    RecomputeOutcome::Failed(e)
                }
            };
            result.recomputes.push(RecomputeResult::new(&request, outcome));
        }
        result.stage.advance(PipelineStage::Written)?;

        let next = if self.settings.max_distance > 0 {
            self.requests_for(cfg, &former, 1)?
        } else {
            Vec::new()
        };
        self.propagate_levels(cfg, next, &mut seen, result)?;
        result.stage.advance(PipelineStage::Propagated)?;
        result.stage.advance(PipelineStage::Done)
    }

    /// Recomputes `frontier`, then each following hop, until nothing new is in range. A
    /// (document, target) pair is recomputed at most once per run.
    fn propagate_levels(
        &self,
        cfg: &Configuration,
        mut frontier: Vec<RecomputeRequest>,
        seen: &mut HashSet<(DocumentKey, String)>,
        result: &mut DegraphmalizeResult,
    ) -> Result<(), DegraphmalizerError> {
        frontier.retain(|r| seen.insert((r.root.key(), r.target())));
        while !frontier.is_empty() {
            tracing::debug!(
                "recomputing {} document(s) at distance {}",
                frontier.len(),
                frontier[0].distance
            );
            result.recomputes.extend(self.recompute_all(&frontier));

            let roots: BTreeSet<(DocumentKey, usize)> = frontier
                .iter()
                .map(|r| (r.root.key(), r.distance))
                .collect();
            let mut next = Vec::new();
            for (root, distance) in roots {
                next.extend(self.plan(cfg, &root, distance)?);
            }
            next.retain(|r| seen.insert((r.root.key(), r.target())));
            frontier = next;
        }
        Ok(())
    }

    fn plan(
        &self,
        cfg: &Configuration,
        root: &DocumentKey,
        distance: usize,
    ) -> Result<Vec<RecomputeRequest>, DegraphmalizerError> {
        if distance >= self.settings.max_distance {
            return Ok(Vec::new());
        }
        let neighbors = self.graph.neighbors(root)?;
        self.requests_for(cfg, &neighbors, distance + 1)
    }

    fn requests_for(
        &self,
        cfg: &Configuration,
        keys: &[DocumentKey],
        distance: usize,
    ) -> Result<Vec<RecomputeRequest>, DegraphmalizerError> {
        let mut requests = Vec::new();
        for key in keys {
            let configs = configs_for(cfg, &key.index, Some(&key.doc_type));
            if configs.is_empty() {
                continue;
            }
            let id = self.graph.vertex(key)?.unwrap_or_else(|| key.at_version(0));
            for config in configs {
                requests.push(RecomputeRequest::new(id.clone(), config, distance));
            }
        }
        Ok(requests)
    }

    fn recompute_all(&self, requests: &[RecomputeRequest]) -> Vec<RecomputeResult> {
        use rayon::prelude::*;
        self.pools
            .recompute
            .install(|| requests.par_iter().map(|r| self.recompute(r)).collect())
    }

    fn derive_all(
        &self,
        requests: &[RecomputeRequest],
    ) -> Vec<Result<Derivation, DegraphmalizerError>> {
        use rayon::prelude::*;
        self.pools
            .recompute
            .install(|| requests.par_iter().map(|r| self.derive(r)).collect())
    }

    fn write_all(
        &self,
        requests: &[RecomputeRequest],
        derived: Vec<Result<Derivation, DegraphmalizerError>>,
    ) -> Vec<RecomputeResult> {
        use rayon::prelude::*;
        self.pools.recompute.install(|| {
            requests
                .par_iter()
                .zip(derived.into_par_iter())
                .map(|(request, derivation)| {
                    let outcome = derivation.and_then(|d| self.write_derivation(request, d));
                    outcome_of(request, outcome)
                })
                .collect()
        })
    }
}

/// Body of the `degraphmalize` thread. Exits once the pipeline is dropped.
fn serve_submissions(pipeline: Weak<Degraphmalizer>, submissions: Receiver<Submission>) {
    for Submission { action, id, events } in submissions {
        let Some(pipeline) = pipeline.upgrade() else {
            break;
        };
        report(&events, DegraphmalizeEvent::Started(action, id.clone()));
        let result = pipeline.process(action, &id);
        let event = if result.error.is_some() {
            DegraphmalizeEvent::Failed(result)
        } else {
            DegraphmalizeEvent::Completed(result)
        };
        report(&events, event);
    }
    tracing::debug!("degraphmalize worker stopped");
}

fn report(events: &Sender<Event>, event: DegraphmalizeEvent) {
    if let Err(e) = events.send(Event::Degraphmalize(event)) {
        tracing::debug!("nobody is listening for pipeline events: {e}");
    }
}
