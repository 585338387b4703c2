use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

use crate::{
    config::{PoolSettings, MAX_POOL_THREADS, MIN_POOL_THREADS},
    error::DegraphmalizerError,
};

/// The executors recompute fan-out and document fetches run on.
///
/// Both are sized from [`PoolSettings`], clamped to `2..=64`. Whole pipeline runs are not
/// pooled: a rayon worker blocked on another pool keeps taking jobs from its own, so the
/// serialized stage lives on a plain thread in [`crate::Degraphmalizer`].
#[derive(Clone)]
pub struct WorkerPools {
    pub recompute: Arc<ThreadPool>,
    pub fetch: Arc<ThreadPool>,
}

pub fn clamp_threads(requested: usize) -> usize {
    requested.clamp(MIN_POOL_THREADS, MAX_POOL_THREADS)
}

fn named_pool(name: &'static str, threads: usize) -> Result<Arc<ThreadPool>, DegraphmalizerError> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |n| format!("{name}-{n}"))
        .build()?;
    Ok(Arc::new(pool))
}

impl WorkerPools {
    pub fn new(settings: &PoolSettings) -> Result<Self, DegraphmalizerError> {
        let recompute = clamp_threads(settings.recompute_threads);
        let fetch = clamp_threads(settings.fetch_threads);
        tracing::debug!("worker pools: recompute={recompute} fetch={fetch}");
        Ok(WorkerPools {
            recompute: named_pool("recompute", recompute)?,
            fetch: named_pool("fetch", fetch)?,
        })
    }
}

impl std::fmt::Debug for WorkerPools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPools")
            .field("recompute", &self.recompute.current_num_threads())
            .field("fetch", &self.fetch.current_num_threads())
            .finish()
    }
}
