//! Database layer — migrations and submitted-batch bookkeeping.
//!
//! A row is written as soon as a batch transaction is accepted by the node so
//! that a restart resumes polling instead of sending the batch again.

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::entry::Address;
use crate::errors::{Result, TrackerError};
use crate::tracker::BatchStatus;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    // Create the database file on first run.
    let url = if url.contains('?') || url.contains(":memory:") {
        url
    } else {
        format!("{url}?mode=rwc")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied successfully");
    Ok(())
}

/// A persisted batch submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBatch {
    pub batch_index: usize,
    pub tx_hash: String,
    pub status: BatchStatus,
    pub addresses: Vec<Address>,
}

#[derive(sqlx::FromRow)]
struct BatchRow {
    batch_index: i64,
    tx_hash: String,
    status: String,
    addresses: String,
}

impl TryFrom<BatchRow> for StoredBatch {
    type Error = TrackerError;

    fn try_from(row: BatchRow) -> Result<Self> {
        let status = BatchStatus::parse(&row.status).ok_or_else(|| {
            TrackerError::Config(format!(
                "unknown status {:?} stored for batch {}",
                row.status, row.batch_index
            ))
        })?;
        Ok(StoredBatch {
            batch_index: row.batch_index as usize,
            tx_hash: row.tx_hash,
            status,
            addresses: serde_json::from_str(&row.addresses)?,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

/// Record a freshly submitted batch as pending. Writing the same batch and
/// tx hash again is a no-op; a different tx hash for a stored batch fails.
pub async fn record_submission(
    pool: &SqlitePool,
    batch_index: usize,
    tx_hash: &str,
    addresses: &[Address],
) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO airdrop_batches (batch_index, tx_hash, status, addresses, submitted_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (batch_index) DO UPDATE SET tx_hash = excluded.tx_hash
        WHERE airdrop_batches.tx_hash = excluded.tx_hash
        "#,
    )
    .bind(batch_index as i64)
    .bind(tx_hash)
    .bind(BatchStatus::Pending.as_str())
    .bind(serde_json::to_string(addresses)?)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(TrackerError::PlanMismatch { batch_index });
    }
    Ok(())
}

/// Store the terminal status of a batch. Fails if the batch has no pending
/// row; a row that is already terminal is left untouched.
pub async fn finish_batch(pool: &SqlitePool, batch_index: usize, status: BatchStatus) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE airdrop_batches
        SET    status = ?1, finished_at = ?2
        WHERE  batch_index = ?3 AND status = 'pending'
        "#,
    )
    .bind(status.as_str())
    .bind(chrono::Utc::now().timestamp())
    .bind(batch_index as i64)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(TrackerError::MissingBatchRow { batch_index });
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

/// All stored batches, ordered by batch index.
pub async fn load_batches(pool: &SqlitePool) -> Result<Vec<StoredBatch>> {
    let rows = sqlx::query_as::<_, BatchRow>(
        r#"
        SELECT batch_index, tx_hash, status, addresses
        FROM   airdrop_batches
        ORDER  BY batch_index ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(StoredBatch::try_from).collect()
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    // One connection: every `:memory:` connection is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    migrate(&pool).await.expect("run migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        Address(bytes)
    }

    #[tokio::test]
    async fn submission_round_trip() {
        let pool = memory_pool().await;
        record_submission(&pool, 0, "0xaa", &[addr(1), addr(2)])
            .await
            .unwrap();
        record_submission(&pool, 1, "0xbb", &[addr(3)]).await.unwrap();
        finish_batch(&pool, 0, BatchStatus::Confirmed).await.unwrap();

        let stored = load_batches(&pool).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].status, BatchStatus::Confirmed);
        assert_eq!(stored[0].addresses, vec![addr(1), addr(2)]);
        assert_eq!(stored[1].tx_hash, "0xbb");
        assert_eq!(stored[1].status, BatchStatus::Pending);
    }

    #[tokio::test]
    async fn terminal_status_is_not_overwritten() {
        let pool = memory_pool().await;
        record_submission(&pool, 0, "0xaa", &[addr(1)]).await.unwrap();
        finish_batch(&pool, 0, BatchStatus::Failed).await.unwrap();
        assert!(matches!(
            finish_batch(&pool, 0, BatchStatus::Confirmed).await,
            Err(TrackerError::MissingBatchRow { batch_index: 0 })
        ));
        assert_eq!(
            load_batches(&pool).await.unwrap()[0].status,
            BatchStatus::Failed
        );
    }

    #[tokio::test]
    async fn finishing_an_unrecorded_batch_is_an_error() {
        let pool = memory_pool().await;
        assert!(matches!(
            finish_batch(&pool, 3, BatchStatus::Confirmed).await,
            Err(TrackerError::MissingBatchRow { batch_index: 3 })
        ));
    }

    #[tokio::test]
    async fn duplicate_batch_index_is_rejected() {
        let pool = memory_pool().await;
        record_submission(&pool, 0, "0xaa", &[addr(1)]).await.unwrap();
        assert!(record_submission(&pool, 0, "0xbb", &[addr(1)]).await.is_err());
        assert_eq!(load_batches(&pool).await.unwrap()[0].tx_hash, "0xaa");
    }

    #[tokio::test]
    async fn repeated_write_of_the_same_submission_is_accepted() {
        let pool = memory_pool().await;
        record_submission(&pool, 0, "0xaa", &[addr(1)]).await.unwrap();
        finish_batch(&pool, 0, BatchStatus::Confirmed).await.unwrap();
        record_submission(&pool, 0, "0xaa", &[addr(1)]).await.unwrap();

        let stored = load_batches(&pool).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, BatchStatus::Confirmed);
    }
}
