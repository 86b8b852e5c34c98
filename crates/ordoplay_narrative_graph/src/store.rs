// SPDX-License-Identifier: MIT OR Apache-2.0
//! Open document tracking.
//!
//! Hosts hold [`SharedDocument`] handles. Re-opening a document that is
//! already open replaces its content in place, so every existing handle
//! sees the reloaded graph.

use crate::graph::{DocumentId, GraphDocument};
use crate::persistence::{GraphPersistence, LoadWarning, PersistenceError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared handle to an open document
pub type SharedDocument = Arc<RwLock<GraphDocument>>;

#[derive(Debug)]
struct OpenDocument {
    handle: SharedDocument,
    path: Option<PathBuf>,
}

/// Documents currently open in a host
#[derive(Debug)]
pub struct DocumentStore {
    persistence: GraphPersistence,
    open: HashMap<DocumentId, OpenDocument>,
}

impl DocumentStore {
    /// Create an empty store
    pub fn new(persistence: GraphPersistence) -> Self {
        Self {
            persistence,
            open: HashMap::new(),
        }
    }

    /// The persistence service
    pub fn persistence(&self) -> &GraphPersistence {
        &self.persistence
    }

    /// Open a document from disk.
    ///
    /// If a document with the same identity is already open its handle is
    /// reused and its content replaced.
    pub fn open(&mut self, path: &Path) -> Result<(SharedDocument, Vec<LoadWarning>), PersistenceError> {
        let outcome = self.persistence.load(path)?;
        let id = outcome.document.id;

        let handle = match self.open.get_mut(&id) {
            Some(entry) => {
                tracing::debug!("Reloading open document {} in place", id);
                *entry.handle.write() = outcome.document;
                entry.path = Some(path.to_path_buf());
                entry.handle.clone()
            }
            None => {
                let handle = Arc::new(RwLock::new(outcome.document));
                self.open.insert(
                    id,
                    OpenDocument {
                        handle: handle.clone(),
                        path: Some(path.to_path_buf()),
                    },
                );
                handle
            }
        };

        Ok((handle, outcome.warnings))
    }

    /// Track a document that has not been saved yet
    pub fn insert(&mut self, document: GraphDocument) -> SharedDocument {
        let id = document.id;
        let handle = Arc::new(RwLock::new(document));
        self.open.insert(
            id,
            OpenDocument {
                handle: handle.clone(),
                path: None,
            },
        );
        handle
    }

    /// Handle of an open document
    pub fn get(&self, id: DocumentId) -> Option<SharedDocument> {
        self.open.get(&id).map(|entry| entry.handle.clone())
    }

    /// Path an open document was loaded from or last saved to
    pub fn path(&self, id: DocumentId) -> Option<&Path> {
        self.open.get(&id)?.path.as_deref()
    }

    /// Save an open document to its known path
    pub fn save(&mut self, id: DocumentId) -> Result<DocumentId, PersistenceError> {
        let entry = self.open.get(&id).ok_or(PersistenceError::NotOpen(id))?;
        let path = entry.path.clone().ok_or(PersistenceError::NoPath(id))?;
        self.save_as(id, &path)
    }

    /// Save an open document to `path`. Returns the persisted identity,
    /// which is the identity already stored at `path` if there was one.
    ///
    /// If that identity is open under another handle, the saved content
    /// is written into that handle and the saving handle stops being
    /// tracked.
    pub fn save_as(&mut self, id: DocumentId, path: &Path) -> Result<DocumentId, PersistenceError> {
        let entry = self.open.get(&id).ok_or(PersistenceError::NotOpen(id))?;
        let persisted_id = {
            let document = entry.handle.read();
            self.persistence.save(&document, path)?
        };

        if persisted_id == id {
            if let Some(entry) = self.open.get_mut(&id) {
                entry.path = Some(path.to_path_buf());
            }
            return Ok(id);
        }

        let Some(mut entry) = self.open.remove(&id) else {
            return Err(PersistenceError::NotOpen(id));
        };
        entry.handle.write().id = persisted_id;

        match self.open.get_mut(&persisted_id) {
            Some(existing) => {
                tracing::debug!("Document {} saved over open document {}", id, persisted_id);
                let saved = entry.handle.read().clone();
                *existing.handle.write() = saved;
                existing.path = Some(path.to_path_buf());
            }
            None => {
                tracing::debug!("Document {} now tracked as {}", id, persisted_id);
                entry.path = Some(path.to_path_buf());
                self.open.insert(persisted_id, entry);
            }
        }
        Ok(persisted_id)
    }

    /// Stop tracking a document. Outstanding handles stay valid.
    pub fn close(&mut self, id: DocumentId) -> Option<SharedDocument> {
        self.open.remove(&id).map(|entry| entry.handle)
    }

    /// Stop tracking every document
    pub fn clear(&mut self) {
        self.open.clear();
    }

    /// Whether a document is open
    pub fn is_open(&self, id: DocumentId) -> bool {
        self.open.contains_key(&id)
    }

    /// Number of open documents
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// Whether no documents are open
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// IDs of open documents
    pub fn ids(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.open.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::create_narrative_registry;
    use crate::settings::GraphSettings;

    fn store() -> DocumentStore {
        let registry = Arc::new(create_narrative_registry());
        DocumentStore::new(GraphPersistence::new(registry, GraphSettings::default()))
    }

    #[test]
    fn test_reopen_replaces_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intro.ron");
        let mut store = store();

        let handle = store.insert(GraphDocument::new_with_start("Intro"));
        let id = handle.read().id;
        assert_eq!(store.save_as(id, &path).unwrap(), id);

        handle.write().name = "Edited".to_string();
        let (reopened, warnings) = store.open(&path).unwrap();
        assert!(warnings.is_empty());
        assert!(Arc::ptr_eq(&handle, &reopened));
        assert_eq!(handle.read().name, "Intro");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_save_over_existing_keeps_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intro.ron");
        let mut store = store();

        let first = store.insert(GraphDocument::new_with_start("First"));
        let first_id = first.read().id;
        store.save_as(first_id, &path).unwrap();
        store.close(first_id);

        let second = store.insert(GraphDocument::new_with_start("Second"));
        let second_id = second.read().id;
        let persisted = store.save_as(second_id, &path).unwrap();

        assert_eq!(persisted, first_id);
        assert_eq!(second.read().id, first_id);
        assert!(store.is_open(first_id));
        assert!(!store.is_open(second_id));
        assert_eq!(store.path(first_id), Some(path.as_path()));
    }

    #[test]
    fn test_save_over_open_identity_updates_its_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intro.ron");
        let mut store = store();

        let first = store.insert(GraphDocument::new_with_start("First"));
        let first_id = first.read().id;
        store.save_as(first_id, &path).unwrap();

        let second = store.insert(GraphDocument::new_with_start("Second"));
        let second_id = second.read().id;
        assert_eq!(store.save_as(second_id, &path).unwrap(), first_id);

        assert_eq!(first.read().name, "Second");
        assert_eq!(first.read().id, first_id);
        assert_eq!(second.read().id, first_id);
        assert!(Arc::ptr_eq(&store.get(first_id).unwrap(), &first));
        assert!(!store.is_open(second_id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_save_without_path() {
        let mut store = store();
        let handle = store.insert(GraphDocument::new("Scratch"));
        let id = handle.read().id;
        assert!(matches!(store.save(id), Err(PersistenceError::NoPath(_))));
        assert!(matches!(
            store.save(DocumentId::new()),
            Err(PersistenceError::NotOpen(_))
        ));
        assert!(store.is_open(id));
    }

    #[test]
    fn test_close_and_clear() {
        let mut store = store();
        let a = store.insert(GraphDocument::new("A")).read().id;
        store.insert(GraphDocument::new("B"));
        assert_eq!(store.len(), 2);

        assert!(store.close(a).is_some());
        assert!(store.get(a).is_none());
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.ids().count(), 0);
    }
}
