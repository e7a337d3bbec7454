//! Durable dedup ledgers: who has already received which listing, and which
//! listings are permanently skipped. The only state carried between cycles.

use crate::listing::ListingId;
use chrono::{DateTime, FixedOffset};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tracing::debug;

const SEEN_TABLE: &str = "seen_listings";
const SKIPPED_TABLE: &str = "skipped_listings";

#[derive(Clone)]
pub struct DedupLedger {
    pool: SqlitePool,
}

impl DedupLedger {
    pub async fn open(path: &str) -> Result<DedupLedger, sqlx::Error> {
        let opt = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opt).await?;
        let ledger = DedupLedger { pool };

        if !ledger.table_exists(SEEN_TABLE).await? {
            sqlx::query(
                "CREATE TABLE seen_listings (
                    listing_id INTEGER NOT NULL,
                    subscriber_id TEXT NOT NULL,
                    created_at DATETIME,
                    PRIMARY KEY (listing_id, subscriber_id)
                 )",
            )
            .execute(&ledger.pool)
            .await?;
            debug!("created {SEEN_TABLE}");
        }
        if !ledger.table_exists(SKIPPED_TABLE).await? {
            sqlx::query(
                "CREATE TABLE skipped_listings (
                    listing_id INTEGER PRIMARY KEY,
                    created_at DATETIME
                 )",
            )
            .execute(&ledger.pool)
            .await?;
            debug!("created {SKIPPED_TABLE}");
        }

        Ok(ledger)
    }

    async fn table_exists(&self, name: &str) -> Result<bool, sqlx::Error> {
        Ok(
            sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
                .is_some(),
        )
    }

    pub async fn has_seen(&self, id: ListingId, subscriber: &str) -> Result<bool, sqlx::Error> {
        Ok(sqlx::query(
            "SELECT listing_id FROM seen_listings WHERE listing_id = ? AND subscriber_id = ?",
        )
        .bind(id.as_db())
        .bind(subscriber)
        .fetch_optional(&self.pool)
        .await?
        .is_some())
    }

    /// Insert-if-absent. Returns whether the pair was newly recorded, so a
    /// second caller racing on the same pair observes `false`.
    pub async fn mark_seen(&self, id: ListingId, subscriber: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO seen_listings (listing_id, subscriber_id, created_at)
             VALUES (?, ?, ?)",
        )
        .bind(id.as_db())
        .bind(subscriber)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_skipped(&self, id: ListingId) -> Result<bool, sqlx::Error> {
        Ok(
            sqlx::query("SELECT listing_id FROM skipped_listings WHERE listing_id = ?")
                .bind(id.as_db())
                .fetch_optional(&self.pool)
                .await?
                .is_some(),
        )
    }

    /// Insert-if-absent, see [`DedupLedger::mark_seen`]. Only ever called for
    /// structural absence, never for transient fetch failures.
    pub async fn mark_skipped(&self, id: ListingId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO skipped_listings (listing_id, created_at) VALUES (?, ?)",
        )
        .bind(id.as_db())
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop one listing from both ledgers so the next cycle re-checks it.
    pub async fn forget(&self, id: ListingId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM seen_listings WHERE listing_id = ?")
            .bind(id.as_db())
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM skipped_listings WHERE listing_id = ?")
            .bind(id.as_db())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn now() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(
        &chrono::offset::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tokio::fs;

    async fn open_fresh(path: &str) -> DedupLedger {
        if Path::new(path).is_file() {
            fs::remove_file(path).await.unwrap();
        }
        DedupLedger::open(path).await.unwrap()
    }

    #[tokio::test]
    async fn creates_database_file() {
        let ledger = open_fresh("test-ledger-create.db").await;
        assert!(Path::new("test-ledger-create.db").is_file());
        drop(ledger);
        fs::remove_file("test-ledger-create.db").await.unwrap();
    }

    #[tokio::test]
    async fn seen_pairs_are_recorded_once() {
        let ledger = open_fresh("test-ledger-seen.db").await;
        let id = ListingId(60395544);

        assert!(!ledger.has_seen(id, "borys").await.unwrap());
        assert!(ledger.mark_seen(id, "borys").await.unwrap());
        assert!(ledger.has_seen(id, "borys").await.unwrap());

        // idempotent, reports not-newly-inserted
        assert!(!ledger.mark_seen(id, "borys").await.unwrap());

        // scoped per subscriber
        assert!(!ledger.has_seen(id, "anton").await.unwrap());
        assert!(ledger.mark_seen(id, "anton").await.unwrap());

        // scoped per listing
        assert!(!ledger.has_seen(ListingId(1), "borys").await.unwrap());

        fs::remove_file("test-ledger-seen.db").await.unwrap();
    }

    #[tokio::test]
    async fn skipped_set_is_idempotent() {
        let ledger = open_fresh("test-ledger-skipped.db").await;
        let id = ListingId(7);

        assert!(!ledger.is_skipped(id).await.unwrap());
        assert!(ledger.mark_skipped(id).await.unwrap());
        assert!(ledger.is_skipped(id).await.unwrap());
        assert!(!ledger.mark_skipped(id).await.unwrap());

        fs::remove_file("test-ledger-skipped.db").await.unwrap();
    }

    #[tokio::test]
    async fn forget_clears_both_ledgers() {
        let ledger = open_fresh("test-ledger-forget.db").await;
        let id = ListingId(42);

        ledger.mark_seen(id, "borys").await.unwrap();
        ledger.mark_skipped(id).await.unwrap();
        ledger.forget(id).await.unwrap();

        assert!(!ledger.has_seen(id, "borys").await.unwrap());
        assert!(!ledger.is_skipped(id).await.unwrap());

        fs::remove_file("test-ledger-forget.db").await.unwrap();
    }

    #[tokio::test]
    async fn reopening_keeps_existing_rows() {
        let path = "test-ledger-reopen.db";
        {
            let ledger = open_fresh(path).await;
            ledger.mark_seen(ListingId(9), "borys").await.unwrap();
        }
        let ledger = DedupLedger::open(path).await.unwrap();
        assert!(ledger.has_seen(ListingId(9), "borys").await.unwrap());

        fs::remove_file(path).await.unwrap();
    }
}
