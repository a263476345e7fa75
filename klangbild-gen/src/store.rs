//! In-memory transaction store
//!
//! Process-wide mapping from transaction id to record, backed by a sharded
//! concurrent map. A mutation runs under the write lock of the record's shard
//! only, so updates to one transaction are atomic and readers never observe a
//! half-applied mutation, while transactions in other shards proceed in
//! parallel. Records are never evicted here.

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ControllerError;
use crate::models::{SynthesisBackend, Transaction};

/// Shared handle to all transaction records
#[derive(Clone, Default)]
pub struct TransactionStore {
    records: Arc<DashMap<Uuid, Transaction>>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh transaction and return its id
    pub fn create(&self, input_image: Vec<u8>, backend: SynthesisBackend) -> Uuid {
        let transaction = Transaction::new(input_image, backend);
        let id = transaction.id();
        self.records.insert(id, transaction);
        tracing::debug!(transaction_id = %id, ?backend, "Transaction created");
        id
    }

    /// Snapshot of a transaction
    pub fn get(&self, id: Uuid) -> Result<Transaction, ControllerError> {
        self.records
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(ControllerError::NotFound(id))
    }

    /// Apply `mutation` atomically to one transaction
    ///
    /// The closure runs while the record's shard is write-locked; it must not
    /// block or await.
    pub fn update<R>(
        &self,
        id: Uuid,
        mutation: impl FnOnce(&mut Transaction) -> R,
    ) -> Result<R, ControllerError> {
        let mut entry = self
            .records
            .get_mut(&id)
            .ok_or(ControllerError::NotFound(id))?;
        Ok(mutation(entry.value_mut()))
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.records.contains_key(&id)
    }

    /// Number of transactions held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
