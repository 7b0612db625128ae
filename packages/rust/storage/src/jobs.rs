//! Bulk pipeline jobs consumed by out-of-process workers.

use chrono::Utc;
use leadsmith_shared::{BulkJob, BulkJobType, LeadsmithError, Result};
use libsql::params;
use uuid::Uuid;

use crate::{Storage, parse_ts, storage_err};

const JOB_COLUMNS: &str = "id, campaign_id, type, config, status, progress, error, created_at";

impl Storage {
    /// Insert a `pending` job with zero progress.
    pub async fn insert_bulk_job(
        &self,
        campaign_id: &str,
        job_type: BulkJobType,
        config: &serde_json::Value,
    ) -> Result<BulkJob> {
        let job = BulkJob {
            id: Uuid::now_v7().to_string(),
            campaign_id: campaign_id.into(),
            job_type,
            config: config.clone(),
            status: "pending".into(),
            progress: 0,
            error: None,
            created_at: Utc::now(),
        };

        self.conn
            .execute(
                "INSERT INTO bulk_jobs (id, campaign_id, type, config, status, progress, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    job.id.as_str(),
                    job.campaign_id.as_str(),
                    job.job_type.as_str(),
                    job.config.to_string(),
                    job.status.as_str(),
                    job.progress,
                    job.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;

        tracing::info!(job_id = %job.id, job_type = %job.job_type, "bulk job created");
        Ok(job)
    }

    /// Most recent jobs, optionally restricted to one campaign.
    pub async fn list_recent_bulk_jobs(
        &self,
        campaign_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<BulkJob>> {
        let mut rows = match campaign_id {
            Some(id) => {
                let sql = format!(
                    "SELECT {JOB_COLUMNS} FROM bulk_jobs WHERE campaign_id = ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2"
                );
                self.conn.query(&sql, params![id, limit]).await
            }
            None => {
                let sql = format!(
                    "SELECT {JOB_COLUMNS} FROM bulk_jobs ORDER BY created_at DESC, id DESC LIMIT ?1"
                );
                self.conn.query(&sql, params![limit]).await
            }
        }
        .map_err(storage_err)?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    pub async fn count_bulk_jobs(&self, campaign_id: &str) -> Result<i64> {
        self.count(
            "SELECT COUNT(*) FROM bulk_jobs WHERE campaign_id = ?1",
            params![campaign_id],
        )
        .await
    }
}

fn row_to_job(row: &libsql::Row) -> Result<BulkJob> {
    let config_json: String = row.get(3).map_err(storage_err)?;
    Ok(BulkJob {
        id: row.get::<String>(0).map_err(storage_err)?,
        campaign_id: row.get::<String>(1).map_err(storage_err)?,
        job_type: row.get::<String>(2).map_err(storage_err)?.parse()?,
        config: serde_json::from_str(&config_json)
            .map_err(|e| LeadsmithError::Storage(format!("invalid job config: {e}")))?,
        status: row.get::<String>(4).map_err(storage_err)?,
        progress: row.get::<i64>(5).unwrap_or(0),
        error: row.get::<String>(6).ok(),
        created_at: parse_ts(&row.get::<String>(7).map_err(storage_err)?)?,
    })
}
