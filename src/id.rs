use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identity of a document without regard to its revision. Graph vertices are keyed by this,
/// since edges extracted from one document point at "whatever the current revision of the
/// other document is".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub index: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub id: String,
}

impl DocumentKey {
    pub fn new(
        index: impl Into<String>,
        doc_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        DocumentKey {
            index: index.into(),
            doc_type: doc_type.into(),
            id: id.into(),
        }
    }

    pub fn at_version(&self, version: u64) -> DocumentId {
        DocumentId {
            index: self.index.clone(),
            doc_type: self.doc_type.clone(),
            id: self.id.clone(),
            version,
        }
    }
}

impl Display for DocumentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.index, self.doc_type, self.id)
    }
}

/// A specific revision of a document. Version `0` is the symbolic "any version" used for
/// edge targets that have not been resolved against the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId {
    pub index: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub id: String,
    pub version: u64,
}

impl DocumentId {
    pub fn new(
        index: impl Into<String>,
        doc_type: impl Into<String>,
        id: impl Into<String>,
        version: u64,
    ) -> Self {
        DocumentId {
            index: index.into(),
            doc_type: doc_type.into(),
            id: id.into(),
            version,
        }
    }

    pub fn key(&self) -> DocumentKey {
        DocumentKey {
            index: self.index.clone(),
            doc_type: self.doc_type.clone(),
            id: self.id.clone(),
        }
    }

    pub fn is_symbolic(&self) -> bool {
        self.version == 0
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}",
            self.index, self.doc_type, self.id, self.version
        )
    }
}

impl From<&DocumentId> for DocumentKey {
    fn from(id: &DocumentId) -> Self {
        id.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_version() {
        let a = DocumentId::new("people", "person", "1", 3);
        let b = DocumentId::new("people", "person", "1", 7);
        assert_ne!(a, b);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().at_version(7), b);
    }

    #[test]
    fn display_forms() {
        let id = DocumentId::new("people", "person", "1", 3);
        assert_eq!(id.to_string(), "people/person/1@3");
        assert_eq!(id.key().to_string(), "people/person/1");
        assert!(!id.is_symbolic());
    }
}
