//! Evaluation persistence.
//!
//! The orchestrator only talks to [`EvaluationStore`]; [`InMemoryStore`] is
//! the bundled implementation. Updates are atomic read-then-write: the
//! closure runs against a copy under the write lock and the copy replaces
//! the stored record only when the closure succeeds.

use std::collections::HashMap;

use cee_core::{EvaluationRecord, StatusError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Evaluation not found: {0}")]
    NotFound(String),

    #[error("Evaluation already exists: {0}")]
    Duplicate(String),

    #[error(transparent)]
    Transition(#[from] StatusError),

    #[error("Update rejected for {evaluation_id}: {reason}")]
    Rejected {
        evaluation_id: String,
        reason: String,
    },
}

/// Storage keyed by evaluation id, queryable by run id and creation time.
pub trait EvaluationStore: Send + Sync {
    fn insert(&self, record: EvaluationRecord) -> Result<(), StoreError>;

    fn get(&self, id: &str) -> Option<EvaluationRecord>;

    /// Apply `apply` atomically and return the record as stored afterwards.
    /// When `apply` fails nothing is written.
    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut EvaluationRecord) -> Result<(), StoreError>,
    ) -> Result<EvaluationRecord, StoreError>;

    /// Records of one run, oldest first.
    fn by_run(&self, run_id: &str) -> Vec<EvaluationRecord>;

    /// Records created at or after `cutoff`, oldest first.
    fn created_since(&self, cutoff: DateTime<Utc>) -> Vec<EvaluationRecord>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, EvaluationRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_sorted(&self, keep: impl Fn(&EvaluationRecord) -> bool) -> Vec<EvaluationRecord> {
        let mut matching: Vec<EvaluationRecord> = self
            .records
            .read()
            .values()
            .filter(|r| keep(r))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        matching
    }
}

impl EvaluationStore for InMemoryStore {
    fn insert(&self, record: EvaluationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if records.contains_key(record.id()) {
            return Err(StoreError::Duplicate(record.id().to_string()));
        }
        records.insert(record.id().to_string(), record);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<EvaluationRecord> {
        self.records.read().get(id).cloned()
    }

    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut EvaluationRecord) -> Result<(), StoreError>,
    ) -> Result<EvaluationRecord, StoreError> {
        let mut records = self.records.write();
        let stored = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut draft = stored.clone();
        apply(&mut draft)?;
        *stored = draft.clone();
        Ok(draft)
    }

    fn by_run(&self, run_id: &str) -> Vec<EvaluationRecord> {
        self.collect_sorted(|r| r.input.run_id == run_id)
    }

    fn created_since(&self, cutoff: DateTime<Utc>) -> Vec<EvaluationRecord> {
        self.collect_sorted(|r| r.created_at >= cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cee_core::{EvaluationInput, EvaluationStatus};

    fn record(run_id: &str) -> EvaluationRecord {
        EvaluationRecord::new(EvaluationInput::new(run_id, "prompt", "output", "model"))
    }

    #[test]
    fn test_insert_and_get() {
        let store = InMemoryStore::new();
        let rec = record("run-1");
        let id = rec.id().to_string();

        store.insert(rec.clone()).unwrap();
        assert_eq!(store.get(&id), Some(rec.clone()));
        assert_eq!(store.insert(rec), Err(StoreError::Duplicate(id)));
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_update_commits_on_success() {
        let store = InMemoryStore::new();
        let rec = record("run-1");
        let id = rec.id().to_string();
        store.insert(rec).unwrap();

        let updated = store
            .update(&id, &mut |r| {
                r.transition(EvaluationStatus::InProgress)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.status(), EvaluationStatus::InProgress);
        assert_eq!(store.get(&id).unwrap().status(), EvaluationStatus::InProgress);
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let store = InMemoryStore::new();
        let rec = record("run-1");
        let id = rec.id().to_string();
        store.insert(rec.clone()).unwrap();

        let err = store
            .update(&id, &mut |r| {
                r.input.output = "changed".into();
                r.transition(EvaluationStatus::Completed)?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Transition(_)));
        assert_eq!(store.get(&id), Some(rec));
    }

    #[test]
    fn test_update_unknown_id() {
        let store = InMemoryStore::new();
        let err = store.update("nope", &mut |_| Ok(())).unwrap_err();
        assert_eq!(err, StoreError::NotFound("nope".into()));
    }

    #[test]
    fn test_queries() {
        let store = InMemoryStore::new();
        let cutoff = Utc::now();
        for run in ["a", "a", "b"] {
            store.insert(record(run)).unwrap();
        }

        assert_eq!(store.by_run("a").len(), 2);
        assert_eq!(store.by_run("b").len(), 1);
        assert!(store.by_run("c").is_empty());
        assert_eq!(store.created_since(cutoff).len(), 3);
        assert!(store
            .created_since(Utc::now() + chrono::Duration::hours(1))
            .is_empty());
    }
}
