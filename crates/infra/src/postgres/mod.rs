//! Postgres adapters.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | Sequence store | Record store |
//! |------------|----------------------|----------------|--------------|
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` | `Store` |
//! | Database (numeric out of range) | `22003` | `Overflow` | `Store` |
//! | Database (other) | Any other | `Storage` | `Store` |
//! | Other | N/A | `Storage` | `Store` |
//!
//! The sequence store never hands back a default on failure; every error
//! reaches the generator, which fails closed.

pub mod records;
pub mod sequence;

pub use records::PostgresRecordStore;
pub use sequence::PostgresSequenceStore;

use sqlx::PgPool;

/// DDL for the only state this pipeline owns.
///
/// `period_key` uses the `C` collation so `YYYYMMDD` keys compare bytewise.
pub const SEQUENCE_STATE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS sequence_state (
    scope       VARCHAR(128) PRIMARY KEY,
    period_key  TEXT COLLATE "C" NOT NULL DEFAULT '',
    counter     BIGINT NOT NULL CHECK (counter >= 0),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Create `sequence_state` if it does not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(SEQUENCE_STATE_DDL).execute(pool).await?;
    Ok(())
}

/// The connection, not the statement, failed.
fn is_connectivity(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)
    )
}

fn is_numeric_overflow(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "22003";
        }
    }
    false
}

fn describe(operation: &str, err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => {
            format!("database error in {}: {}", operation, db_err.message())
        }
        sqlx::Error::PoolClosed => format!("connection pool closed in {}", operation),
        sqlx::Error::PoolTimedOut => format!("connection pool timed out in {}", operation),
        sqlx::Error::RowNotFound => format!("unexpected row not found in {}", operation),
        other => format!("sqlx error in {}: {}", operation, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_failures_count_as_connectivity() {
        assert!(is_connectivity(&sqlx::Error::PoolClosed));
        assert!(is_connectivity(&sqlx::Error::PoolTimedOut));
        assert!(!is_connectivity(&sqlx::Error::RowNotFound));
        assert!(!is_numeric_overflow(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn description_names_the_operation() {
        let msg = describe("advance_sequence", &sqlx::Error::PoolClosed);
        assert_eq!(msg, "connection pool closed in advance_sequence");
    }
}
