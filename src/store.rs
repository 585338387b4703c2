//! The document side of the backing store.
//!
//! [`DocumentStore`] is the boundary to whatever search/document engine holds the source and
//! derived documents. [`MemoryStore`] is an in-process implementation used by the binary and the
//! tests.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::DegraphmalizerError,
    id::{DocumentId, DocumentKey},
};

/// A document body at a specific revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub source: Value,
}

impl Document {
    pub fn new(id: DocumentId, source: Value) -> Self {
        Document { id, source }
    }
}

pub trait DocumentStore: Send + Sync {
    /// Latest revision of the document, or `None` when absent. The version of `id` is not used
    /// to select a revision; callers compare `Document::id` themselves.
    fn get(&self, id: &DocumentId) -> Result<Option<Document>, DegraphmalizerError>;

    /// Stores `source` as the new revision of `index/type/id` and returns its identity.
    fn write(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: Value,
    ) -> Result<DocumentId, DegraphmalizerError>;

    /// Removes the document, returning the revision that was removed.
    fn delete(&self, key: &DocumentKey) -> Result<Option<DocumentId>, DegraphmalizerError>;

    fn list_aliases(&self, index: &str) -> Result<BTreeSet<String>, DegraphmalizerError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<DocumentKey, Document>>,
    aliases: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Seeds a document at an explicit version.
    pub fn put(&self, id: DocumentId, source: Value) {
        self.documents
            .write()
            .insert(id.key(), Document::new(id, source));
    }

    pub fn add_alias(&self, index: impl Into<String>, alias: impl Into<String>) {
        self.aliases
            .write()
            .entry(index.into())
            .or_default()
            .insert(alias.into());
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, id: &DocumentId) -> Result<Option<Document>, DegraphmalizerError> {
        Ok(self.documents.read().get(&id.key()).cloned())
    }

    fn write(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: Value,
    ) -> Result<DocumentId, DegraphmalizerError> {
        let key = DocumentKey::new(index, doc_type, id);
        let mut documents = self.documents.write();
        let version = documents.get(&key).map(|d| d.id.version).unwrap_or(0) + 1;
        let doc_id = key.at_version(version);
        tracing::debug!("writing {doc_id}");
        documents.insert(key, Document::new(doc_id.clone(), source));
        Ok(doc_id)
    }

    fn delete(&self, key: &DocumentKey) -> Result<Option<DocumentId>, DegraphmalizerError> {
        Ok(self.documents.write().remove(key).map(|d| d.id))
    }

    fn list_aliases(&self, index: &str) -> Result<BTreeSet<String>, DegraphmalizerError> {
        Ok(self.aliases.read().get(index).cloned().unwrap_or_default())
    }
}
