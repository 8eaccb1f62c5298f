//! Postgres-backed sequence store.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use tablepos_sequence::{PeriodKey, SequenceScope, SequenceState, SequenceStore, SequenceStoreError};

use super::{describe, is_connectivity, is_numeric_overflow};

/// Counters in the `sequence_state` table.
///
/// ## Atomicity
///
/// `advance` is a single `INSERT .. ON CONFLICT DO UPDATE .. RETURNING`: the
/// row lock taken by the upsert makes the period comparison, the reset and the
/// increment one indivisible step, across every process sharing the database.
/// No application-side lock is involved.
#[derive(Debug, Clone)]
pub struct PostgresSequenceStore {
    pool: Arc<PgPool>,
}

impl PostgresSequenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl SequenceStore for PostgresSequenceStore {
    #[instrument(
        skip(self),
        fields(scope = %scope, period = %period, counter = tracing::field::Empty),
        err
    )]
    async fn advance(
        &self,
        scope: &SequenceScope,
        period: &PeriodKey,
    ) -> Result<SequenceState, SequenceStoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO sequence_state (scope, period_key, counter, updated_at)
            VALUES ($1, $2, 1, NOW())
            ON CONFLICT (scope) DO UPDATE SET
                counter = CASE
                    WHEN EXCLUDED.period_key > sequence_state.period_key THEN 1
                    ELSE sequence_state.counter + 1
                END,
                period_key = GREATEST(sequence_state.period_key, EXCLUDED.period_key),
                updated_at = NOW()
            RETURNING period_key, counter
            "#,
        )
        .bind(scope.as_str())
        .bind(period.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("advance_sequence", scope, e))?;

        let state = state_from_row(scope, &row)?;
        Span::current().record("counter", state.counter);
        Ok(state)
    }

    #[instrument(skip(self), fields(scope = %scope), err)]
    async fn current(
        &self,
        scope: &SequenceScope,
    ) -> Result<Option<SequenceState>, SequenceStoreError> {
        let row = sqlx::query(
            r#"
            SELECT period_key, counter
            FROM sequence_state
            WHERE scope = $1
            "#,
        )
        .bind(scope.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("read_sequence", scope, e))?;

        row.map(|row| state_from_row(scope, &row)).transpose()
    }
}

fn state_from_row(
    scope: &SequenceScope,
    row: &sqlx::postgres::PgRow,
) -> Result<SequenceState, SequenceStoreError> {
    let period_key: String = row
        .try_get("period_key")
        .map_err(|e| SequenceStoreError::Storage(format!("failed to read period_key: {}", e)))?;
    let counter: i64 = row
        .try_get("counter")
        .map_err(|e| SequenceStoreError::Storage(format!("failed to read counter: {}", e)))?;
    let counter = u64::try_from(counter)
        .map_err(|_| SequenceStoreError::Storage(format!("negative counter {counter} for {scope}")))?;

    Ok(SequenceState {
        scope: scope.clone(),
        period_key: PeriodKey::from_stored(period_key),
        counter,
    })
}

/// Map SQLx errors to SequenceStoreError.
fn map_sqlx_error(operation: &str, scope: &SequenceScope, err: sqlx::Error) -> SequenceStoreError {
    if is_numeric_overflow(&err) {
        return SequenceStoreError::Overflow(scope.to_string());
    }
    let msg = describe(operation, &err);
    if is_connectivity(&err) {
        SequenceStoreError::Unavailable(msg)
    } else {
        SequenceStoreError::Storage(msg)
    }
}
