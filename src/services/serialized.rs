//! Per-document serialization for a document service shared by concurrent
//! runs. Batches against the same document never interleave; different
//! documents proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::DocumentService;
use crate::document::{DocumentTree, EditOp};

pub struct SerializedDocumentService {
    inner: Arc<dyn DocumentService>,
    locks: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SerializedDocumentService {
    pub fn new(inner: Arc<dyn DocumentService>) -> Self {
        Self {
            inner,
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, document_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the entry for `document_id` once no other caller holds its lock.
    fn release(&self, document_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        // One reference in the map, one in `lock`.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(document_id);
        }
    }

    /// Documents with a lock entry right now.
    pub fn tracked_documents(&self) -> usize {
        self.locks.lock().len()
    }
}

#[async_trait]
impl DocumentService for SerializedDocumentService {
    async fn get_snapshot(&self, document_id: &str) -> Result<DocumentTree, String> {
        let lock = self.lock_for(document_id);
        let snapshot = {
            let _guard = lock.lock().await;
            self.inner.get_snapshot(document_id).await
        };
        self.release(document_id, lock);
        snapshot
    }

    async fn apply_batch(&self, document_id: &str, ops: &[EditOp]) -> Result<(), String> {
        let lock = self.lock_for(document_id);
        let applied = {
            let _guard = lock.lock().await;
            self.inner.apply_batch(document_id, ops).await
        };
        self.release(document_id, lock);
        applied
    }
}
