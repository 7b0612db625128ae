//! Campaign records.

use leadsmith_shared::{Campaign, Result};
use libsql::params;

use crate::{Storage, parse_ts, storage_err};

const CAMPAIGN_COLUMNS: &str =
    "id, customer_id, name, service_line, summarize_prompt, icebreaker_prompt, status, created_at";

impl Storage {
    /// Insert a new campaign.
    pub async fn insert_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO campaigns (id, customer_id, name, service_line, summarize_prompt,
                                        icebreaker_prompt, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    campaign.id.as_str(),
                    campaign.customer_id.as_str(),
                    campaign.name.as_str(),
                    campaign.service_line.as_str(),
                    campaign.summarize_prompt.as_str(),
                    campaign.icebreaker_prompt.as_str(),
                    campaign.status.as_str(),
                    campaign.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get a campaign by ID.
    pub async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1");
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_campaign(&row)?)),
            None => Ok(None),
        }
    }

    /// List all campaigns, newest first.
    pub async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY created_at DESC");
        let mut rows = self.conn.query(&sql, params![]).await.map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_campaign(&row)?);
        }
        Ok(results)
    }
}

fn row_to_campaign(row: &libsql::Row) -> Result<Campaign> {
    Ok(Campaign {
        id: row.get::<String>(0).map_err(storage_err)?,
        customer_id: row.get::<String>(1).map_err(storage_err)?,
        name: row.get::<String>(2).map_err(storage_err)?,
        service_line: row.get::<String>(3).unwrap_or_default(),
        summarize_prompt: row.get::<String>(4).unwrap_or_default(),
        icebreaker_prompt: row.get::<String>(5).unwrap_or_default(),
        status: row.get::<String>(6).map_err(storage_err)?,
        created_at: parse_ts(&row.get::<String>(7).map_err(storage_err)?)?,
    })
}
