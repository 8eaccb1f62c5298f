//! Counter storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::scope::{PeriodKey, SequenceScope, SequenceState};

/// Durable counter storage keyed by scope.
///
/// `advance` is the only mutation: it must behave as one indivisible
/// "reset-if-the-period-moved-forward, then increment-and-read". Implementations
/// must not serialize through a lock held by the caller, since several processes
/// share one store.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Atomically advance the counter of `scope` within `period`.
    ///
    /// - A newer `period` than the stored one resets the counter to 0 first.
    /// - An older `period` (a caller that read the calendar just before a
    ///   rollover) advances the stored, newer period instead.
    ///
    /// The returned state carries the period the counter was taken from.
    async fn advance(
        &self,
        scope: &SequenceScope,
        period: &PeriodKey,
    ) -> Result<SequenceState, SequenceStoreError>;

    /// Read the current state without modifying it.
    async fn current(&self, scope: &SequenceScope)
        -> Result<Option<SequenceState>, SequenceStoreError>;
}

#[async_trait]
impl<S> SequenceStore for Arc<S>
where
    S: SequenceStore + ?Sized,
{
    async fn advance(
        &self,
        scope: &SequenceScope,
        period: &PeriodKey,
    ) -> Result<SequenceState, SequenceStoreError> {
        (**self).advance(scope, period).await
    }

    async fn current(
        &self,
        scope: &SequenceScope,
    ) -> Result<Option<SequenceState>, SequenceStoreError> {
        (**self).current(scope).await
    }
}

/// Sequence store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SequenceStoreError {
    #[error("sequence store unavailable: {0}")]
    Unavailable(String),
    #[error("counter overflow for scope {0}")]
    Overflow(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory sequence store for tests/dev.
///
/// The map lock is the store's own atomicity; generators never see it.
#[derive(Debug, Default)]
pub struct InMemorySequenceStore {
    states: Mutex<HashMap<SequenceScope, SequenceState>>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seed a scope with pre-existing state (e.g. migrated counters).
    pub fn seed(&self, state: SequenceState) -> Result<(), SequenceStoreError> {
        let mut states = self
            .states
            .lock()
            .map_err(|_| SequenceStoreError::Storage("lock poisoned".to_string()))?;
        states.insert(state.scope.clone(), state);
        Ok(())
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn advance(
        &self,
        scope: &SequenceScope,
        period: &PeriodKey,
    ) -> Result<SequenceState, SequenceStoreError> {
        let mut states = self
            .states
            .lock()
            .map_err(|_| SequenceStoreError::Storage("lock poisoned".to_string()))?;

        let state = states
            .entry(scope.clone())
            .or_insert_with(|| SequenceState {
                scope: scope.clone(),
                period_key: period.clone(),
                counter: 0,
            });

        if *period > state.period_key {
            state.period_key = period.clone();
            state.counter = 0;
        }

        state.counter = state
            .counter
            .checked_add(1)
            .ok_or_else(|| SequenceStoreError::Overflow(scope.to_string()))?;

        Ok(state.clone())
    }

    async fn current(
        &self,
        scope: &SequenceScope,
    ) -> Result<Option<SequenceState>, SequenceStoreError> {
        let states = self
            .states
            .lock()
            .map_err(|_| SequenceStoreError::Storage("lock poisoned".to_string()))?;
        Ok(states.get(scope).cloned())
    }
}
