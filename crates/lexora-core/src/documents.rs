use tracing::{debug, warn};

/// A document as last reported by the backend.
///
/// `id` is the position in the most recent listing and only identifies the
/// row for rendering. It changes across refreshes; `name` is the key the
/// backend understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: usize,
    pub name: String,
}

/// Client-side mirror of the backend's document set.
///
/// Holds the snapshot from the last successful listing, replaced wholesale.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    documents: Vec<Document>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot with a fresh listing, in backend order.
    pub fn replace(&mut self, names: Vec<String>) {
        let before = names.len();
        self.documents = names
            .into_iter()
            .filter(|name| !name.is_empty())
            .enumerate()
            .map(|(id, name)| Document { id, name })
            .collect();

        if self.documents.len() != before {
            warn!(dropped = before - self.documents.len(), "ignored documents with empty names");
        }
        debug!(count = self.documents.len(), "document snapshot replaced");
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn get(&self, index: usize) -> Option<&Document> {
        self.documents.get(index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.documents.iter().any(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
