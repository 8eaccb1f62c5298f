//! Formatted code generators.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use tablepos_core::{RequestContext, within_deadline};

use super::calendar::BusinessCalendar;
use super::scope::{PeriodKey, SequenceScope, SequenceState};
use super::store::{SequenceStore, SequenceStoreError};

/// Default width of never-resetting codes (`000042`).
pub const DEFAULT_INCR_WIDTH: usize = 6;

/// Default width of the counter part of daily codes (`20240521-0007`).
pub const DEFAULT_DAILY_WIDTH: usize = 4;

/// Sequence generation error.
///
/// Both variants are fail-closed: callers must not fall back to a made-up code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SequenceError {
    /// The store could not complete the atomic advance.
    #[error("sequence unavailable for scope {scope}: {reason}")]
    Unavailable { scope: String, reason: String },

    /// The request deadline elapsed while waiting on the store.
    #[error("sequence request timed out for scope {scope}")]
    Timeout { scope: String },
}

impl SequenceError {
    fn unavailable(scope: &SequenceScope, err: SequenceStoreError) -> Self {
        Self::Unavailable {
            scope: scope.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Produces the next business code for one scope.
#[async_trait]
pub trait SequenceGenerator: Send + Sync {
    fn scope(&self) -> &SequenceScope;

    async fn next(&self, ctx: &RequestContext) -> Result<String, SequenceError>;
}

#[async_trait]
impl<G> SequenceGenerator for Box<G>
where
    G: SequenceGenerator + ?Sized,
{
    fn scope(&self) -> &SequenceScope {
        (**self).scope()
    }

    async fn next(&self, ctx: &RequestContext) -> Result<String, SequenceError> {
        (**self).next(ctx).await
    }
}

/// One bounded round trip to the store.
async fn advance_within<S>(
    store: &S,
    ctx: &RequestContext,
    scope: &SequenceScope,
    period: &PeriodKey,
) -> Result<SequenceState, SequenceError>
where
    S: SequenceStore + ?Sized,
{
    match within_deadline(ctx, store.advance(scope, period)).await {
        Ok(Ok(state)) => Ok(state),
        Ok(Err(err)) => {
            warn!(scope = %scope, error = %err, "sequence store rejected advance");
            Err(SequenceError::unavailable(scope, err))
        }
        Err(_) => {
            warn!(scope = %scope, "sequence advance exceeded request deadline");
            Err(SequenceError::Timeout {
                scope: scope.to_string(),
            })
        }
    }
}

/// Never-resetting counter rendered as a zero-padded number.
///
/// Counters wider than `width` are rendered in full rather than truncated.
#[derive(Debug, Clone)]
pub struct IncrSequence<S> {
    store: S,
    scope: SequenceScope,
    width: usize,
    prefix: String,
}

impl<S: SequenceStore> IncrSequence<S> {
    pub fn new(store: S, scope: SequenceScope) -> Self {
        Self {
            store,
            scope,
            width: DEFAULT_INCR_WIDTH,
            prefix: String::new(),
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Static prefix prepended to every code (e.g. `D` for departments).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn format(&self, counter: u64) -> String {
        format!("{}{:0width$}", self.prefix, counter, width = self.width)
    }
}

#[async_trait]
impl<S: SequenceStore> SequenceGenerator for IncrSequence<S> {
    fn scope(&self) -> &SequenceScope {
        &self.scope
    }

    #[instrument(skip(self, ctx), fields(scope = %self.scope), err)]
    async fn next(&self, ctx: &RequestContext) -> Result<String, SequenceError> {
        let state = advance_within(&self.store, ctx, &self.scope, &PeriodKey::none()).await?;
        let code = self.format(state.counter);
        debug!(code = %code, counter = state.counter, "minted sequence code");
        Ok(code)
    }
}

/// Counter that restarts at 1 on every business date.
///
/// Codes read `{YYYYMMDD}-{counter}`; the date is the period the store actually
/// advanced, which may be newer than the one this caller observed.
#[derive(Debug, Clone)]
pub struct DailySequence<S, B> {
    store: S,
    calendar: B,
    scope: SequenceScope,
    width: usize,
}

impl<S: SequenceStore, B: BusinessCalendar> DailySequence<S, B> {
    pub fn new(store: S, calendar: B, scope: SequenceScope) -> Self {
        Self {
            store,
            calendar,
            scope,
            width: DEFAULT_DAILY_WIDTH,
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    fn format(&self, state: &SequenceState) -> String {
        format!(
            "{}-{:0width$}",
            state.period_key,
            state.counter,
            width = self.width
        )
    }
}

#[async_trait]
impl<S: SequenceStore, B: BusinessCalendar> SequenceGenerator for DailySequence<S, B> {
    fn scope(&self) -> &SequenceScope {
        &self.scope
    }

    #[instrument(skip(self, ctx), fields(scope = %self.scope), err)]
    async fn next(&self, ctx: &RequestContext) -> Result<String, SequenceError> {
        let period = PeriodKey::business_date(self.calendar.business_date());
        let state = advance_within(&self.store, ctx, &self.scope, &period).await?;
        if state.period_key != period {
            debug!(observed = %period, stored = %state.period_key, "business date rolled over mid-request");
        }
        let code = self.format(&state);
        debug!(code = %code, counter = state.counter, "minted daily sequence code");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{NaiveDate, TimeZone, Utc};
    use tablepos_core::{ManualClock, StoreId, TenantId, UserId};
    use tokio::task::JoinSet;

    use crate::calendar::{FixedCalendar, RolloverCalendar};
    use crate::store::InMemorySequenceStore;

    fn ctx() -> RequestContext {
        RequestContext::new(TenantId::new(), StoreId::new(), UserId::new())
    }

    fn scope(key: &str) -> SequenceScope {
        SequenceScope::new(key).unwrap()
    }

    /// Store that is always down.
    struct DownStore;

    #[async_trait]
    impl SequenceStore for DownStore {
        async fn advance(
            &self,
            _scope: &SequenceScope,
            _period: &PeriodKey,
        ) -> Result<SequenceState, SequenceStoreError> {
            Err(SequenceStoreError::Unavailable("connection refused".to_string()))
        }

        async fn current(
            &self,
            _scope: &SequenceScope,
        ) -> Result<Option<SequenceState>, SequenceStoreError> {
            Err(SequenceStoreError::Unavailable("connection refused".to_string()))
        }
    }

    /// Store whose round trip takes longer than any test deadline.
    struct SlowStore(InMemorySequenceStore);

    #[async_trait]
    impl SequenceStore for SlowStore {
        async fn advance(
            &self,
            scope: &SequenceScope,
            period: &PeriodKey,
        ) -> Result<SequenceState, SequenceStoreError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            self.0.advance(scope, period).await
        }

        async fn current(
            &self,
            scope: &SequenceScope,
        ) -> Result<Option<SequenceState>, SequenceStoreError> {
            self.0.current(scope).await
        }
    }

    #[tokio::test]
    async fn incr_sequence_is_zero_padded() {
        let store = InMemorySequenceStore::arc();
        let seq = IncrSequence::new(store, scope("backend_department_seq"));

        assert_eq!(seq.next(&ctx()).await.unwrap(), "000001");
        assert_eq!(seq.next(&ctx()).await.unwrap(), "000002");
    }

    #[tokio::test]
    async fn incr_sequence_continues_from_existing_state() {
        let store = InMemorySequenceStore::arc();
        let s = scope("backend_role_seq");
        store
            .seed(SequenceState {
                scope: s.clone(),
                period_key: PeriodKey::none(),
                counter: 41,
            })
            .unwrap();

        let seq = IncrSequence::new(store, s).with_prefix("R");
        assert_eq!(seq.next(&ctx()).await.unwrap(), "R000042");
    }

    #[tokio::test]
    async fn counters_wider_than_width_are_not_truncated() {
        let store = InMemorySequenceStore::arc();
        let s = scope("backend_tax_fee_seq");
        store
            .seed(SequenceState {
                scope: s.clone(),
                period_key: PeriodKey::none(),
                counter: 999,
            })
            .unwrap();

        let seq = IncrSequence::new(store, s).with_width(3);
        assert_eq!(seq.next(&ctx()).await.unwrap(), "1000");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_incr_calls_are_unique_and_gapless() {
        const CALLERS: u64 = 200;
        let store = InMemorySequenceStore::arc();
        let s = scope("backend_department_seq");
        store
            .seed(SequenceState {
                scope: s.clone(),
                period_key: PeriodKey::none(),
                counter: 1_000,
            })
            .unwrap();
        let seq = Arc::new(IncrSequence::new(store, s));

        let mut tasks = JoinSet::new();
        for _ in 0..CALLERS {
            let seq = seq.clone();
            tasks.spawn(async move { seq.next(&ctx()).await });
        }

        let mut counters = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let code = joined.unwrap().unwrap();
            counters.push(code.parse::<u64>().unwrap());
        }

        counters.sort_unstable();
        let expected: Vec<u64> = (1_001..=1_000 + CALLERS).collect();
        assert_eq!(counters, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_daily_calls_are_unique() {
        const CALLERS: usize = 100;
        let store = InMemorySequenceStore::arc();
        let calendar = FixedCalendar(NaiveDate::from_ymd_opt(2024, 5, 21).unwrap());
        let seq = Arc::new(DailySequence::new(store, calendar, scope("backend_user_seq")));

        let mut tasks = JoinSet::new();
        for _ in 0..CALLERS {
            let seq = seq.clone();
            tasks.spawn(async move { seq.next(&ctx()).await });
        }

        let mut codes = Vec::with_capacity(CALLERS);
        while let Some(joined) = tasks.join_next().await {
            codes.push(joined.unwrap().unwrap());
        }
        codes.sort();
        let expected: Vec<String> = (1..=CALLERS).map(|n| format!("20240521-{n:04}")).collect();
        assert_eq!(codes, expected);
    }

    #[tokio::test]
    async fn daily_sequence_restarts_on_new_business_date() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 21, 10, 0, 0).unwrap(),
        ));
        let calendar = RolloverCalendar::new(clock.clone(), 0, 3).unwrap();
        let seq = DailySequence::new(
            InMemorySequenceStore::arc(),
            calendar,
            scope("backend_user_seq"),
        );

        assert_eq!(seq.next(&ctx()).await.unwrap(), "20240521-0001");
        assert_eq!(seq.next(&ctx()).await.unwrap(), "20240521-0002");

        // 02:00 next calendar day is still the 21st's business day.
        clock.set(Utc.with_ymd_and_hms(2024, 5, 22, 2, 0, 0).unwrap());
        assert_eq!(seq.next(&ctx()).await.unwrap(), "20240521-0003");

        clock.set(Utc.with_ymd_and_hms(2024, 5, 22, 3, 0, 0).unwrap());
        assert_eq!(seq.next(&ctx()).await.unwrap(), "20240522-0001");
    }

    #[tokio::test]
    async fn store_failure_fails_closed() {
        let seq = IncrSequence::new(DownStore, scope("backend_department_seq"));
        let err = seq.next(&ctx()).await.unwrap_err();
        assert!(matches!(err, SequenceError::Unavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_enforced() {
        let seq = IncrSequence::new(
            SlowStore(InMemorySequenceStore::new()),
            scope("backend_department_seq"),
        );
        let ctx = ctx().with_timeout(Duration::from_millis(100));

        let err = seq.next(&ctx).await.unwrap_err();
        assert_eq!(
            err,
            SequenceError::Timeout {
                scope: "backend_department_seq".to_string()
            }
        );
    }
}
