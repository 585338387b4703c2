use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    id::{DocumentId, DocumentKey},
    store::{Document, DocumentStore},
};

pub const DEFAULT_CACHE_CAPACITY: usize = 2048;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub load_failures: u64,
    pub entries: usize,
}

/// Bounded LRU of fetched documents in front of a [`DocumentStore`].
///
/// Safe to share between fetch workers. Misses load from the store outside the lock, so two
/// workers missing on the same id may both load it; the later insert wins.
pub struct DocumentCache {
    store: Arc<dyn DocumentStore>,
    entries: Mutex<LruCache<DocumentId, Document>>,
    hits: AtomicU64,
    misses: AtomicU64,
    load_failures: AtomicU64,
}

impl DocumentCache {
    pub fn new(store: Arc<dyn DocumentStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        DocumentCache {
            store,
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
        }
    }

    /// The cached document, loading it from the store on a miss. Missing documents and store
    /// failures both come back as `None`; failures are logged and not cached.
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        if let Some(doc) = self.entries.lock().get(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(doc.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        match self.store.get(id) {
            Ok(Some(doc)) => {
                self.entries.lock().put(id.clone(), doc.clone());
                Some(doc)
            }
            Ok(None) => None,
            Err(e) => {
                self.load_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("document cache could not load {id}: {e}");
                None
            }
        }
    }

    /// Drops every cached revision of the document.
    pub fn invalidate(&self, key: &DocumentKey) {
        let mut entries = self.entries.lock();
        let stale: Vec<DocumentId> = entries
            .iter()
            .filter(|(id, _)| &id.key() == key)
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            entries.pop(&id);
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            entries: self.entries.lock().len(),
        }
    }
}
