pub mod expiry;

use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use weekpack_core::{now_ts, MetadataUpdate, PackPage, PageMetadata, StoredPack};

pub use expiry::next_sunday_expiry;

/// Default bound on waiting for another rebuilder to finish.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(15);
/// Default sleep between lock acquisition attempts.
pub const DEFAULT_LOCK_POLL: Duration = Duration::from_millis(100);

/// Shared durable state: page metadata, weekly packs, and the domain
/// rebuild-lock table. All rebuilders and readers go through one `Storage`.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn open(path: &str) -> Result<Self> {
        Self::with_pool_size(path, 16).await
    }

    pub async fn with_pool_size(path: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!(path, max_connections, "opened sqlite store");
        Ok(Self { pool })
    }

    /// Isolated in-memory store, used by the test suites.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        info!("migrations complete");
        Ok(())
    }

    pub async fn check_connectivity(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ---- metadata store ----

    pub async fn get_page_metadata(&self, domain: &str, url: &str) -> Result<Option<PageMetadata>> {
        let row = sqlx::query(
            r#"SELECT domain, url, pack_hash, etag, last_modified, text_hash, last_checked_at, updated_at
               FROM metadata_store
               WHERE domain = ?1 AND url = ?2"#,
        )
        .bind(domain)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => Some(PageMetadata {
                domain: row.try_get("domain")?,
                url: row.try_get("url")?,
                pack_hash: row.try_get("pack_hash")?,
                etag: row.try_get("etag")?,
                last_modified: row.try_get("last_modified")?,
                text_hash: row.try_get("text_hash")?,
                last_checked_at: row.try_get("last_checked_at")?,
                updated_at: row.try_get("updated_at")?,
            }),
            None => None,
        })
    }

    /// Insert or wholly replace the row for (domain, url). `updated_at` is
    /// stamped here so it can never lag `last_checked_at`.
    pub async fn upsert_page_metadata(
        &self,
        domain: &str,
        url: &str,
        update: &MetadataUpdate,
    ) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO metadata_store (
                   domain, url, pack_hash, etag, last_modified, text_hash, last_checked_at, updated_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
               ON CONFLICT(domain, url) DO UPDATE SET
                   pack_hash = excluded.pack_hash,
                   etag = excluded.etag,
                   last_modified = excluded.last_modified,
                   text_hash = excluded.text_hash,
                   last_checked_at = excluded.last_checked_at,
                   updated_at = excluded.updated_at"#,
        )
        .bind(domain)
        .bind(url)
        .bind(&update.pack_hash)
        .bind(&update.etag)
        .bind(&update.last_modified)
        .bind(&update.text_hash)
        .bind(update.last_checked_at)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_metadata_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM metadata_store")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    // ---- pack store ----

    pub async fn purge_expired_packs(&self, now: f64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pack_store WHERE expires_at < ?1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        let purged = result.rows_affected();
        if purged > 0 {
            debug!(purged, "dropped expired packs");
        }
        Ok(purged)
    }

    pub async fn get_pack(&self, domain: &str) -> Result<Option<StoredPack>> {
        let row = sqlx::query(
            "SELECT domain, pack_json, pack_hash, fetched_at, expires_at FROM pack_store WHERE domain = ?1",
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => {
                let body: String = row.try_get("pack_json")?;
                let pages: Vec<PackPage> = serde_json::from_str(&body)?;
                Some(StoredPack {
                    domain: row.try_get("domain")?,
                    pages,
                    pack_hash: row.try_get("pack_hash")?,
                    fetched_at: row.try_get("fetched_at")?,
                    expires_at: row.try_get("expires_at")?,
                })
            }
            None => None,
        })
    }

    pub async fn save_pack(
        &self,
        domain: &str,
        pages: &[PackPage],
        pack_hash: &str,
        fetched_at: f64,
        expires_at: f64,
    ) -> Result<()> {
        let body = serde_json::to_string(pages)?;
        sqlx::query(
            r#"INSERT INTO pack_store (domain, pack_json, pack_hash, fetched_at, expires_at)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(domain) DO UPDATE SET
                   pack_json = excluded.pack_json,
                   pack_hash = excluded.pack_hash,
                   fetched_at = excluded.fetched_at,
                   expires_at = excluded.expires_at"#,
        )
        .bind(domain)
        .bind(body)
        .bind(pack_hash)
        .bind(fetched_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_pack_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pack_store")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    // ---- domain rebuild lock ----

    /// Try to insert the lock row for `domain`, polling on conflict until
    /// `timeout` elapses. Returns false when another rebuilder kept the lock
    /// for the whole window. Not reentrant, not fair.
    pub async fn acquire_domain_lock(
        &self,
        domain: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let inserted = sqlx::query("INSERT INTO domain_lock (domain, locked_at) VALUES (?1, ?2)")
                .bind(domain)
                .bind(now_ts())
                .execute(&self.pool)
                .await;

            match inserted {
                Ok(_) => {
                    debug!(domain, "acquired domain lock");
                    return Ok(true);
                }
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {}
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(poll_interval).await;
        }
    }

    /// Delete the lock row. Idempotent; runs on every rebuild exit path.
    pub async fn release_domain_lock(&self, domain: &str) -> Result<()> {
        sqlx::query("DELETE FROM domain_lock WHERE domain = ?1")
            .bind(domain)
            .execute(&self.pool)
            .await?;
        debug!(domain, "released domain lock");
        Ok(())
    }

    pub async fn get_lock_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM domain_lock")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
