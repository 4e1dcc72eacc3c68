use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::domain::{ApplicationRecord, ApplicationStatus, OfficerNote};

/// Storage abstraction so the service module can be exercised in isolation.
pub trait ApplicationRepository: Send + Sync {
    /// Register a record under its generated id and, when present, its original id.
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn lookup(&self, id: &str) -> Result<ApplicationRecord, RepositoryError>;
    fn list(
        &self,
        decision_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;
    fn append_note(&self, id: &str, note: OfficerNote) -> Result<ApplicationRecord, RepositoryError>;
    fn update_status(
        &self,
        id: &str,
        status: ApplicationStatus,
    ) -> Result<ApplicationRecord, RepositoryError>;
    /// Every distinct record once, in insertion order.
    fn records(&self) -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("application id '{0}' is already registered")]
    Conflict(String),
    #[error("application not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default)]
struct StoreState {
    /// Records in insertion order; both ids of a record index the same slot.
    slots: Vec<ApplicationRecord>,
    index: HashMap<String, usize>,
}

impl StoreState {
    fn resolve(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied().or_else(|| {
            self.slots
                .iter()
                .position(|record| record.original_id.as_deref() == Some(id))
        })
    }
}

/// Process-lifetime store guarded by a single mutex so dual-key registration and per-record
/// mutations are observed whole.
#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    state: Mutex<StoreState>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every record and alias.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.slots.clear();
        state.index.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A panic while holding the guard cannot leave a half-indexed record: every mutation
        // validates before it writes.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<F>(&self, id: &str, apply: F) -> Result<ApplicationRecord, RepositoryError>
    where
        F: FnOnce(&mut ApplicationRecord),
    {
        let mut state = self.lock();
        let slot = state.resolve(id).ok_or(RepositoryError::NotFound)?;
        let record = &mut state.slots[slot];
        apply(record);
        Ok(record.clone())
    }
}

impl ApplicationRepository for InMemoryApplicationStore {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut state = self.lock();

        let generated = record.application_id.0.clone();
        let mut keys = vec![generated.clone()];
        if let Some(original) = record.original_id.as_ref() {
            if *original != generated {
                keys.push(original.clone());
            }
        }

        if let Some(taken) = keys.iter().find(|key| state.index.contains_key(key.as_str())) {
            return Err(RepositoryError::Conflict(taken.clone()));
        }

        let slot = state.slots.len();
        state.slots.push(record.clone());
        for key in keys {
            state.index.insert(key, slot);
        }

        Ok(record)
    }

    fn lookup(&self, id: &str) -> Result<ApplicationRecord, RepositoryError> {
        let state = self.lock();
        state
            .resolve(id)
            .map(|slot| state.slots[slot].clone())
            .ok_or(RepositoryError::NotFound)
    }

    fn list(
        &self,
        decision_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let state = self.lock();
        let mut matching: Vec<(usize, &ApplicationRecord)> = state
            .slots
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                decision_filter
                    .map(str::trim)
                    .filter(|filter| !filter.is_empty())
                    .map_or(true, |filter| record.decision.matches_label(filter))
            })
            .collect();

        // Newest first; later insertions win ties on identical timestamps.
        matching.sort_by(|(slot_a, a), (slot_b, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| slot_b.cmp(slot_a))
        });

        Ok(matching
            .into_iter()
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn append_note(&self, id: &str, note: OfficerNote) -> Result<ApplicationRecord, RepositoryError> {
        self.mutate(id, |record| record.officer_notes.push(note))
    }

    fn update_status(
        &self,
        id: &str,
        status: ApplicationStatus,
    ) -> Result<ApplicationRecord, RepositoryError> {
        self.mutate(id, |record| record.status = status)
    }

    fn records(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Ok(self.lock().slots.clone())
    }
}
