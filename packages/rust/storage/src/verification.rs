//! Bulk email-verification file bookkeeping.

use chrono::Utc;
use leadsmith_shared::{EmailVerificationFile, LeadsmithError, Result};
use libsql::params;
use uuid::Uuid;

use crate::{Storage, opt_ts, parse_ts, storage_err};

const FILE_COLUMNS: &str = "id, campaign_id, file_id, emails, lines, lines_processed, processed,
    status, checked_at, created_at";

impl Storage {
    /// Record a freshly submitted verification batch (`processed = false`).
    pub async fn insert_verification_file(
        &self,
        campaign_id: &str,
        file_id: &str,
        emails: &[String],
    ) -> Result<EmailVerificationFile> {
        let file = EmailVerificationFile {
            id: Uuid::now_v7().to_string(),
            campaign_id: campaign_id.into(),
            file_id: file_id.into(),
            emails: emails.to_vec(),
            lines: Some(emails.len() as i64),
            lines_processed: None,
            processed: false,
            status: None,
            checked_at: None,
            created_at: Utc::now(),
        };
        let emails_json =
            serde_json::to_string(&file.emails).map_err(|e| LeadsmithError::Storage(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO email_verification_files
                   (id, campaign_id, file_id, emails, lines, processed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                params![
                    file.id.as_str(),
                    file.campaign_id.as_str(),
                    file.file_id.as_str(),
                    emails_json,
                    file.lines,
                    file.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(file)
    }

    pub async fn get_verification_file(&self, id: &str) -> Result<Option<EmailVerificationFile>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM email_verification_files WHERE id = ?1");
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_file(&row)?)),
            None => Ok(None),
        }
    }

    /// Oldest unprocessed files first.
    pub async fn list_unprocessed_files(&self, limit: u32) -> Result<Vec<EmailVerificationFile>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM email_verification_files
             WHERE processed = 0
             ORDER BY created_at ASC
             LIMIT ?1"
        );
        let mut rows = self.conn.query(&sql, params![limit]).await.map_err(storage_err)?;

        let mut files = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            files.push(row_to_file(&row)?);
        }
        Ok(files)
    }

    /// Store the latest provider-side progress. Counters the provider did
    /// not report keep their previous value.
    pub async fn record_file_check(
        &self,
        id: &str,
        status: Option<&str>,
        lines: Option<i64>,
        lines_processed: Option<i64>,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE email_verification_files
                 SET status = ?1,
                     lines = COALESCE(?2, lines),
                     lines_processed = COALESCE(?3, lines_processed),
                     checked_at = ?4
                 WHERE id = ?5",
                params![status, lines, lines_processed, Utc::now().to_rfc3339(), id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Refresh only `checked_at`, after a failed status lookup.
    pub async fn touch_file_checked(&self, id: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE email_verification_files SET checked_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn mark_file_processed(&self, id: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE email_verification_files SET processed = 1, checked_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

fn row_to_file(row: &libsql::Row) -> Result<EmailVerificationFile> {
    let emails_json: String = row.get(3).map_err(storage_err)?;
    let emails: Vec<String> = serde_json::from_str(&emails_json)
        .map_err(|e| LeadsmithError::Storage(format!("invalid emails column: {e}")))?;

    Ok(EmailVerificationFile {
        id: row.get::<String>(0).map_err(storage_err)?,
        campaign_id: row.get::<String>(1).map_err(storage_err)?,
        file_id: row.get::<String>(2).map_err(storage_err)?,
        emails,
        lines: row.get::<i64>(4).ok(),
        lines_processed: row.get::<i64>(5).ok(),
        processed: row.get::<i64>(6).map_err(storage_err)? != 0,
        status: row.get::<String>(7).ok(),
        checked_at: opt_ts(row, 8)?,
        created_at: parse_ts(&row.get::<String>(9).map_err(storage_err)?)?,
    })
}
