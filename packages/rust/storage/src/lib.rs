//! Turso Embedded / libSQL storage layer.
//!
//! The [`Storage`] struct wraps a libSQL database holding campaigns, leads,
//! the per-lead enrichment queue, the enrichment error ledger, bulk
//! email-verification files and bulk pipeline jobs.
//!
//! Operations are grouped by concern in submodules, each adding methods to
//! [`Storage`]. Nothing here spans a multi-statement transaction: bulk
//! updates are chunked by the caller and every statement stands alone.

mod campaigns;
mod jobs;
mod leads;
mod migrations;
mod queue;
mod verification;

use std::path::Path;

use chrono::{DateTime, Utc};
use leadsmith_shared::{LeadsmithError, Result};
use libsql::{Connection, Database, params};

pub use leads::LeadStats;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeadsmithError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        LeadsmithError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Run a single `SELECT COUNT(*) ...` style query.
    async fn count(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<i64> {
        let mut rows = self.conn.query(sql, params).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get::<i64>(0).map_err(storage_err),
            None => Ok(0),
        }
    }
}

pub(crate) fn storage_err(e: libsql::Error) -> LeadsmithError {
    LeadsmithError::Storage(e.to_string())
}

/// Parse an RFC 3339 column value.
pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LeadsmithError::Storage(format!("invalid date '{s}': {e}")))
}

/// Parse an optional RFC 3339 column; a NULL column reads as `None`.
pub(crate) fn opt_ts(row: &libsql::Row, idx: i32) -> Result<Option<DateTime<Utc>>> {
    match row.get::<String>(idx).ok() {
        Some(s) => parse_ts(&s).map(Some),
        None => Ok(None),
    }
}
