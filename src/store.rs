//! SQLite persistence for the ledger, sync cursor, and last summary
//!
//! Everything a run produces is written once, at the end, inside a single
//! transaction. Reads happen once at run start.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::ledger::{EntryType, LedgerEntry};
use crate::summary::Summary;
use crate::sync::SyncCursor;

/// Ledger database wrapper
pub struct Store {
    pool: SqlitePool,
}

/// Row type for ledger_entries queries
#[derive(FromRow)]
struct LedgerEntryRow {
    txid: String,
    date: String,
    timestamp: String,
    addresses: String,
    entry_type: String,
    amount_ltc: f64,
    net_ltc: f64,
    unit_price: Option<f64>,
}

/// Row counts for the startup banner
pub struct StoreStats {
    pub entries: i64,
    pub priced: i64,
    pub seen_txids: i64,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries ({} priced), {} seen txids",
            self.entries, self.priced, self.seen_txids
        )
    }
}

impl Store {
    /// Open or create the ledger database
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // SQLx requires the file to exist for SQLite
        if !path.exists() {
            std::fs::File::create(path)?;
        }

        let url = format!("sqlite:{}", path.display());
        let pool = SqlitePool::connect(&url)
            .await
            .context("Failed to open ledger database")?;

        // WAL mode and a busy timeout avoid SQLITE_BUSY if two runs overlap
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout=5000")
            .execute(&pool)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    #[cfg(test)]
    async fn open_in_memory() -> Result<Self> {
        use sqlx::sqlite::SqlitePoolOptions;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "
            -- One row per ledgered transaction
            CREATE TABLE IF NOT EXISTS ledger_entries (
                txid TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                addresses TEXT NOT NULL,
                entry_type TEXT NOT NULL,
                amount_ltc REAL NOT NULL,
                net_ltc REAL NOT NULL,
                unit_price REAL,
                fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            -- Every txid ever ingested or discarded as dust
            CREATE TABLE IF NOT EXISTS seen_txids (
                txid TEXT PRIMARY KEY
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            -- Cursor height, last summary snapshot, last update time
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load the full ledger, oldest first
    pub async fn load_ledger(&self) -> Result<Vec<LedgerEntry>> {
        let rows: Vec<LedgerEntryRow> = sqlx::query_as(
            "SELECT txid, date, timestamp, addresses, entry_type, amount_ltc, net_ltc, unit_price
             FROM ledger_entries
             ORDER BY timestamp",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for r in rows {
            let timestamp = DateTime::parse_from_rfc3339(&r.timestamp)
                .with_context(|| format!("Bad timestamp for entry {}", r.txid))?
                .with_timezone(&Utc);
            let addresses: Vec<String> = serde_json::from_str(&r.addresses)
                .with_context(|| format!("Bad address list for entry {}", r.txid))?;
            let entry_type = match r.entry_type.as_str() {
                "spend" => EntryType::Spend,
                _ => EntryType::Receive,
            };

            entries.push(LedgerEntry {
                txid: r.txid,
                date: r.date,
                timestamp,
                addresses,
                entry_type,
                amount_ltc: r.amount_ltc,
                net_ltc: r.net_ltc,
                unit_price: r.unit_price,
            });
        }

        Ok(entries)
    }

    /// Load the sync cursor; empty on a first run
    pub async fn load_cursor(&self) -> Result<SyncCursor> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT txid FROM seen_txids")
            .fetch_all(&self.pool)
            .await?;
        let seen_txids: HashSet<String> = rows.into_iter().map(|(t,)| t).collect();

        let highest: Option<(String,)> =
            sqlx::query_as("SELECT value FROM metadata WHERE key = 'highest_block'")
                .fetch_optional(&self.pool)
                .await?;
        let highest_block_seen = highest.and_then(|(v,)| v.parse::<u64>().ok());

        Ok(SyncCursor {
            highest_block_seen,
            seen_txids,
        })
    }

    /// Persist the run's fully-merged state in one transaction
    pub async fn save_run(
        &self,
        entries: &[LedgerEntry],
        cursor: &SyncCursor,
        summary: &Summary,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            sqlx::query(
                "INSERT OR REPLACE INTO ledger_entries
                 (txid, date, timestamp, addresses, entry_type, amount_ltc, net_ltc, unit_price)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&entry.txid)
            .bind(&entry.date)
            .bind(entry.timestamp.to_rfc3339())
            .bind(serde_json::to_string(&entry.addresses)?)
            .bind(entry.entry_type.as_str())
            .bind(entry.amount_ltc)
            .bind(entry.net_ltc)
            .bind(entry.unit_price)
            .execute(&mut *tx)
            .await?;
        }

        for txid in &cursor.seen_txids {
            sqlx::query("INSERT OR IGNORE INTO seen_txids (txid) VALUES (?)")
                .bind(txid)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(height) = cursor.highest_block_seen {
            sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES ('highest_block', ?)")
                .bind(height.to_string())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES ('last_summary', ?)")
            .bind(serde_json::to_string(summary)?)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES ('last_updated', ?)")
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Row counts for the startup banner
    pub async fn stats(&self) -> Result<StoreStats> {
        let (entries,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ledger_entries")
            .fetch_one(&self.pool)
            .await?;
        let (priced,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ledger_entries WHERE unit_price IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        let (seen_txids,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM seen_txids")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            entries,
            priced,
            seen_txids,
        })
    }
}

/// Delete the database and its WAL sidecar files. Returns whether anything
/// was actually removed.
pub fn delete_database(path: &Path) -> Result<bool> {
    let files = [
        path.to_path_buf(),
        PathBuf::from(format!("{}-wal", path.display())),
        PathBuf::from(format!("{}-shm", path.display())),
    ];

    let mut removed = false;
    for file in files {
        if file.exists() {
            std::fs::remove_file(&file)
                .with_context(|| format!("Failed to delete {}", file.display()))?;
            removed = true;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::calculate_summary;
    use chrono::DateTime;

    fn test_entry(txid: &str, unit_price: Option<f64>) -> LedgerEntry {
        LedgerEntry {
            txid: txid.to_string(),
            date: "2024-02-01".to_string(),
            timestamp: DateTime::from_timestamp(1_706_745_600, 0).unwrap(),
            addresses: vec!["Lalice".to_string(), "Lbob".to_string()],
            entry_type: EntryType::Receive,
            amount_ltc: 1.5,
            net_ltc: 1.5,
            unit_price,
        }
    }

    #[test]
    fn test_delete_database_missing_file() {
        assert!(!delete_database(Path::new("/nonexistent/tracker.sqlite")).unwrap());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.load_ledger().await.unwrap().is_empty());

        let cursor = store.load_cursor().await.unwrap();
        assert_eq!(cursor.highest_block_seen, None);
        assert!(cursor.seen_txids.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let store = Store::open_in_memory().await.unwrap();

        let entries = vec![test_entry("tx1", Some(72.5)), test_entry("tx2", None)];
        let mut cursor = SyncCursor::default();
        cursor.observe_block(2_600_000);
        cursor.seen_txids.insert("tx1".to_string());
        cursor.seen_txids.insert("tx2".to_string());
        cursor.seen_txids.insert("dusty".to_string());
        let summary = calculate_summary(&entries, Some(80.0), 3.0);

        store.save_run(&entries, &cursor, &summary).await.unwrap();

        let loaded = store.load_ledger().await.unwrap();
        assert_eq!(loaded.len(), 2);
        let tx1 = loaded.iter().find(|e| e.txid == "tx1").unwrap();
        assert_eq!(tx1.date, "2024-02-01");
        assert_eq!(tx1.addresses, vec!["Lalice".to_string(), "Lbob".to_string()]);
        assert_eq!(tx1.entry_type, EntryType::Receive);
        assert_eq!(tx1.unit_price, Some(72.5));
        assert_eq!(tx1.timestamp, entries[0].timestamp);

        let loaded_cursor = store.load_cursor().await.unwrap();
        assert_eq!(loaded_cursor.highest_block_seen, Some(2_600_000));
        assert_eq!(loaded_cursor.seen_txids.len(), 3);
        assert!(loaded_cursor.seen_txids.contains("dusty"));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.priced, 1);
        assert_eq!(stats.seen_txids, 3);
    }

    #[tokio::test]
    async fn test_price_fill_survives_resave() {
        let store = Store::open_in_memory().await.unwrap();
        let cursor = SyncCursor::default();
        let summary = calculate_summary(&[], None, 3.0);

        let unpriced = vec![test_entry("tx1", None)];
        store.save_run(&unpriced, &cursor, &summary).await.unwrap();

        // Next run resolves the price and rewrites the same row
        let priced = vec![test_entry("tx1", Some(64.0))];
        store.save_run(&priced, &cursor, &summary).await.unwrap();

        let loaded = store.load_ledger().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].unit_price, Some(64.0));
    }
}
