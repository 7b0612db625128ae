//! Lead records, icebreaker state, the enrichment error ledger, and the
//! bulk updates used by verification and casualization.

use chrono::{DateTime, Utc};
use leadsmith_shared::{
    EnrichmentFlags, EnrichmentJob, IceStatus, Lead, LeadsmithError, Result, VerificationStatus,
};
use libsql::{Value, params};
use serde::Serialize;

use crate::{Storage, opt_ts, parse_ts, storage_err};

const LEAD_COLUMNS: &str = "id, campaign_id, customer_id, company_name, company_website,
    company_name_casual, email, personal_email, phone, full_name, first_name, last_name,
    title, industry, city, state, country, raw, decision_maker_name, decision_maker_title,
    decision_maker_email, decision_maker_linkedin, ice_breaker, ice_status, enriched_at,
    verification_status, verification_checked_at, enrichment_status, created_at";

/// Coverage counts for one campaign's leads.
///
/// A text column counts as present when it is non-null and not blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeadStats {
    pub total: i64,
    pub with_email: i64,
    pub with_website: i64,
    pub with_decision_maker: i64,
    pub with_casual_name: i64,
    pub with_icebreaker: i64,
    pub validated: i64,
}

impl LeadStats {
    pub fn without_email(&self) -> i64 {
        self.total - self.with_email
    }

    pub fn without_decision_maker(&self) -> i64 {
        self.total - self.with_decision_maker
    }
}

impl Storage {
    // -----------------------------------------------------------------------
    // Lead CRUD
    // -----------------------------------------------------------------------

    /// Insert a new lead.
    pub async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        let flags = serde_json::to_string(&lead.enrichment_status)
            .map_err(|e| LeadsmithError::Storage(e.to_string()))?;
        let sql = format!(
            "INSERT INTO leads ({LEAD_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29)"
        );
        self.conn
            .execute(
                &sql,
                params![
                    lead.id.as_str(),
                    lead.campaign_id.as_str(),
                    lead.customer_id.as_str(),
                    lead.company_name.as_deref(),
                    lead.company_website.as_deref(),
                    lead.company_name_casual.as_deref(),
                    lead.email.as_deref(),
                    lead.personal_email.as_deref(),
                    lead.phone.as_deref(),
                    lead.full_name.as_deref(),
                    lead.first_name.as_deref(),
                    lead.last_name.as_deref(),
                    lead.title.as_deref(),
                    lead.industry.as_deref(),
                    lead.city.as_deref(),
                    lead.state.as_deref(),
                    lead.country.as_deref(),
                    lead.raw.as_deref(),
                    lead.decision_maker_name.as_deref(),
                    lead.decision_maker_title.as_deref(),
                    lead.decision_maker_email.as_deref(),
                    lead.decision_maker_linkedin.as_deref(),
                    lead.ice_breaker.as_deref(),
                    lead.ice_status.as_str(),
                    lead.enriched_at.map(|t| t.to_rfc3339()),
                    lead.verification_status.as_str(),
                    lead.verification_checked_at.map(|t| t.to_rfc3339()),
                    flags,
                    lead.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get a lead by ID.
    pub async fn get_lead(&self, id: &str) -> Result<Option<Lead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1");
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_lead(&row)?)),
            None => Ok(None),
        }
    }

    /// IDs of a tenant's `pending` leads in a campaign.
    pub async fn list_pending_lead_ids(
        &self,
        campaign_id: &str,
        customer_id: &str,
    ) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM leads
                 WHERE campaign_id = ?1 AND customer_id = ?2 AND ice_status = 'pending'
                 ORDER BY created_at",
                params![campaign_id, customer_id],
            )
            .await
            .map_err(storage_err)?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            ids.push(row.get::<String>(0).map_err(storage_err)?);
        }
        Ok(ids)
    }

    /// Most recently created leads of a campaign.
    pub async fn sample_leads(&self, campaign_id: &str, limit: u32) -> Result<Vec<Lead>> {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE campaign_id = ?1
             ORDER BY created_at DESC LIMIT ?2"
        );
        let mut rows = self
            .conn
            .query(&sql, params![campaign_id, limit])
            .await
            .map_err(storage_err)?;

        let mut leads = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            leads.push(row_to_lead(&row)?);
        }
        Ok(leads)
    }

    /// Coverage counts for a campaign, computed in one pass.
    pub async fn lead_stats(&self, campaign_id: &str) -> Result<LeadStats> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*),
                        COUNT(NULLIF(TRIM(email), '')),
                        COUNT(NULLIF(TRIM(company_website), '')),
                        COUNT(NULLIF(TRIM(decision_maker_name), '')),
                        COUNT(NULLIF(TRIM(company_name_casual), '')),
                        COUNT(NULLIF(TRIM(ice_breaker), '')),
                        COALESCE(SUM(json_extract(enrichment_status, '$.website_validated') = 1), 0)
                 FROM leads WHERE campaign_id = ?1",
                params![campaign_id],
            )
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(LeadStats::default());
        };
        Ok(LeadStats {
            total: row.get::<i64>(0).map_err(storage_err)?,
            with_email: row.get::<i64>(1).map_err(storage_err)?,
            with_website: row.get::<i64>(2).map_err(storage_err)?,
            with_decision_maker: row.get::<i64>(3).map_err(storage_err)?,
            with_casual_name: row.get::<i64>(4).map_err(storage_err)?,
            with_icebreaker: row.get::<i64>(5).map_err(storage_err)?,
            validated: row.get::<i64>(6).map_err(storage_err)?,
        })
    }

    /// Replace a lead's enrichment flag set.
    pub async fn set_enrichment_flags(&self, lead_id: &str, flags: &EnrichmentFlags) -> Result<()> {
        let json =
            serde_json::to_string(flags).map_err(|e| LeadsmithError::Storage(e.to_string()))?;
        self.conn
            .execute(
                "UPDATE leads SET enrichment_status = ?1 WHERE id = ?2",
                params![json, lead_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Icebreaker state
    // -----------------------------------------------------------------------

    /// Current `ice_status` of a lead, or `None` when the lead does not exist.
    pub async fn get_ice_status(&self, lead_id: &str) -> Result<Option<IceStatus>> {
        let mut rows = self
            .conn
            .query("SELECT ice_status FROM leads WHERE id = ?1", params![lead_id])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(storage_err)?.parse()?)),
            None => Ok(None),
        }
    }

    /// Move a lead to `next`, rejecting transitions outside the lifecycle.
    ///
    /// The update is conditional on the status that was read, so a lead
    /// changed by someone else in between is reported as an invalid
    /// transition instead of being overwritten. Returns the previous status.
    pub async fn set_ice_status(
        &self,
        lead_id: &str,
        next: IceStatus,
        reenrich: bool,
    ) -> Result<IceStatus> {
        let current = self
            .get_ice_status(lead_id)
            .await?
            .ok_or_else(|| LeadsmithError::not_found("lead", lead_id))?;
        current.transition(next, reenrich)?;

        let changed = self
            .conn
            .execute(
                "UPDATE leads SET ice_status = ?1 WHERE id = ?2 AND ice_status = ?3",
                params![next.as_str(), lead_id, current.as_str()],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(LeadsmithError::InvalidTransition {
                from: current.as_str().into(),
                to: next.as_str().into(),
            });
        }
        Ok(current)
    }

    /// Persist a finished icebreaker: `processing -> done`.
    pub async fn complete_icebreaker(&self, lead_id: &str, ice_breaker: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE leads SET ice_breaker = ?1, ice_status = 'done', enriched_at = ?2
                 WHERE id = ?3 AND ice_status = 'processing'",
                params![ice_breaker, Utc::now().to_rfc3339(), lead_id],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(self.rejected_transition(lead_id, IceStatus::Done).await);
        }
        Ok(())
    }

    /// Record a lead-level failure: upsert the error ledger row and move the
    /// lead `processing -> error`.
    pub async fn record_enrichment_error(
        &self,
        lead_id: &str,
        campaign_id: &str,
        message: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO enrichment_jobs (lead_id, campaign_id, status, error, updated_at)
                 VALUES (?1, ?2, 'error', ?3, ?4)
                 ON CONFLICT(lead_id) DO UPDATE SET
                   campaign_id = excluded.campaign_id,
                   status = excluded.status,
                   error = excluded.error,
                   updated_at = excluded.updated_at",
                params![lead_id, campaign_id, message, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(storage_err)?;

        let changed = self
            .conn
            .execute(
                "UPDATE leads SET ice_status = 'error' WHERE id = ?1 AND ice_status = 'processing'",
                params![lead_id],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(self.rejected_transition(lead_id, IceStatus::Error).await);
        }
        Ok(())
    }

    /// Error ledger row for a lead, if it ever failed.
    pub async fn get_enrichment_job(&self, lead_id: &str) -> Result<Option<EnrichmentJob>> {
        let mut rows = self
            .conn
            .query(
                "SELECT lead_id, campaign_id, status, error, updated_at
                 FROM enrichment_jobs WHERE lead_id = ?1",
                params![lead_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(EnrichmentJob {
                lead_id: row.get::<String>(0).map_err(storage_err)?,
                campaign_id: row.get::<String>(1).map_err(storage_err)?,
                status: row.get::<String>(2).map_err(storage_err)?,
                error: row.get::<String>(3).ok(),
                updated_at: parse_ts(&row.get::<String>(4).map_err(storage_err)?)?,
            })),
            None => Ok(None),
        }
    }

    async fn rejected_transition(&self, lead_id: &str, to: IceStatus) -> LeadsmithError {
        match self.get_ice_status(lead_id).await {
            Ok(Some(from)) => LeadsmithError::InvalidTransition {
                from: from.as_str().into(),
                to: to.as_str().into(),
            },
            Ok(None) => LeadsmithError::not_found("lead", lead_id),
            Err(e) => e,
        }
    }

    // -----------------------------------------------------------------------
    // Casual names
    // -----------------------------------------------------------------------

    /// `(id, company_name)` of leads with a company name but no casual name.
    pub async fn leads_missing_casual_name(
        &self,
        campaign_id: &str,
        limit: u32,
    ) -> Result<Vec<(String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, company_name FROM leads
                 WHERE campaign_id = ?1
                   AND company_name IS NOT NULL
                   AND company_name_casual IS NULL
                 ORDER BY created_at
                 LIMIT ?2",
                params![campaign_id, limit],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push((
                row.get::<String>(0).map_err(storage_err)?,
                row.get::<String>(1).map_err(storage_err)?,
            ));
        }
        Ok(results)
    }

    pub async fn set_casual_name(&self, lead_id: &str, casual: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE leads SET company_name_casual = ?1 WHERE id = ?2",
                params![casual, lead_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Verification
    // -----------------------------------------------------------------------

    /// One page of `(lead_id, email)` pairs for leads that have an email.
    /// Ordered by lead ID so consecutive offsets never overlap.
    pub async fn page_lead_emails(
        &self,
        campaign_id: &str,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<(String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, email FROM leads
                 WHERE campaign_id = ?1 AND email IS NOT NULL
                 ORDER BY id
                 LIMIT ?2 OFFSET ?3",
                params![campaign_id, limit, offset as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push((
                row.get::<String>(0).map_err(storage_err)?,
                row.get::<String>(1).map_err(storage_err)?,
            ));
        }
        Ok(results)
    }

    /// Set `verification_status` and `verification_checked_at` on the given
    /// leads in a single statement. Returns the number of rows updated.
    pub async fn set_verification_status(
        &self,
        lead_ids: &[String],
        status: VerificationStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<u64> {
        if lead_ids.is_empty() {
            return Ok(0);
        }

        let placeholders = (0..lead_ids.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE leads SET verification_status = ?1, verification_checked_at = ?2
             WHERE id IN ({placeholders})"
        );

        let mut values = Vec::with_capacity(lead_ids.len() + 2);
        values.push(Value::Text(status.as_str().into()));
        values.push(Value::Text(checked_at.to_rfc3339()));
        values.extend(lead_ids.iter().map(|id| Value::Text(id.clone())));

        self.conn
            .execute(&sql, libsql::params_from_iter(values))
            .await
            .map_err(storage_err)
    }
}

fn row_to_lead(row: &libsql::Row) -> Result<Lead> {
    let text = |idx: i32| row.get::<String>(idx).ok();
    let flags = text(27)
        .and_then(|s| serde_json::from_str::<EnrichmentFlags>(&s).ok())
        .unwrap_or_default();

    Ok(Lead {
        id: row.get::<String>(0).map_err(storage_err)?,
        campaign_id: row.get::<String>(1).map_err(storage_err)?,
        customer_id: row.get::<String>(2).map_err(storage_err)?,
        company_name: text(3),
        company_website: text(4),
        company_name_casual: text(5),
        email: text(6),
        personal_email: text(7),
        phone: text(8),
        full_name: text(9),
        first_name: text(10),
        last_name: text(11),
        title: text(12),
        industry: text(13),
        city: text(14),
        state: text(15),
        country: text(16),
        raw: text(17),
        decision_maker_name: text(18),
        decision_maker_title: text(19),
        decision_maker_email: text(20),
        decision_maker_linkedin: text(21),
        ice_breaker: text(22),
        ice_status: row.get::<String>(23).map_err(storage_err)?.parse()?,
        enriched_at: opt_ts(row, 24)?,
        verification_status: row.get::<String>(25).map_err(storage_err)?.parse()?,
        verification_checked_at: opt_ts(row, 26)?,
        enrichment_status: flags,
        created_at: parse_ts(&row.get::<String>(28).map_err(storage_err)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[tokio::test]
    async fn lead_roundtrip() {
        let (storage, campaign) = seeded().await;
        let lead = add_lead(&storage, &campaign, |l| {
            l.company_name = Some("Acme Roofing LLC".into());
            l.company_website = Some("acme.test".into());
            l.email = Some("Owner@Acme.test".into());
            l.raw = Some(r#"{"headline":"Owner at Acme"}"#.into());
        })
        .await;

        let found = storage.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(found.company_website.as_deref(), Some("acme.test"));
        assert_eq!(found.email.as_deref(), Some("Owner@Acme.test"));
        assert_eq!(found.ice_status, IceStatus::Pending);
        assert_eq!(found.verification_status, VerificationStatus::Unverified);
        assert!(found.phone.is_none());
        assert!(found.enriched_at.is_none());
        assert!(!found.enrichment_status.website_validated);
    }

    #[tokio::test]
    async fn status_transitions_are_checked() {
        let (storage, campaign) = seeded().await;
        let lead = add_lead(&storage, &campaign, |_| {}).await;

        let prev = storage
            .set_ice_status(&lead.id, IceStatus::Queued, false)
            .await
            .unwrap();
        assert_eq!(prev, IceStatus::Pending);

        // queued -> done skips processing
        let err = storage.complete_icebreaker(&lead.id, "Hi").await.unwrap_err();
        assert!(matches!(err, LeadsmithError::InvalidTransition { .. }));

        storage
            .set_ice_status(&lead.id, IceStatus::Processing, false)
            .await
            .unwrap();
        storage.complete_icebreaker(&lead.id, "Hi there").await.unwrap();

        let done = storage.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(done.ice_status, IceStatus::Done);
        assert_eq!(done.ice_breaker.as_deref(), Some("Hi there"));
        assert!(done.enriched_at.is_some());

        // done is never reset without reenrich
        assert!(
            storage
                .set_ice_status(&lead.id, IceStatus::Processing, false)
                .await
                .is_err()
        );
        assert!(
            storage
                .set_ice_status(&lead.id, IceStatus::Queued, false)
                .await
                .is_err()
        );
        storage
            .set_ice_status(&lead.id, IceStatus::Queued, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_lead_is_not_found() {
        let (storage, _) = seeded().await;
        let err = storage
            .set_ice_status("nope", IceStatus::Queued, false)
            .await
            .unwrap_err();
        assert!(matches!(err, LeadsmithError::NotFound { .. }));
    }

    #[tokio::test]
    async fn error_ledger_upserts() {
        let (storage, campaign) = seeded().await;
        let lead = add_lead(&storage, &campaign, |l| l.ice_status = IceStatus::Processing).await;

        storage
            .record_enrichment_error(&lead.id, &campaign.id, "scrape: timeout")
            .await
            .unwrap();
        let job = storage.get_enrichment_job(&lead.id).await.unwrap().unwrap();
        assert_eq!(job.status, "error");
        assert_eq!(job.error.as_deref(), Some("scrape: timeout"));

        let failed = storage.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(failed.ice_status, IceStatus::Error);

        // re-queue and fail again: the single ledger row is overwritten
        storage.set_ice_status(&lead.id, IceStatus::Queued, false).await.unwrap();
        storage.set_ice_status(&lead.id, IceStatus::Processing, false).await.unwrap();
        storage
            .record_enrichment_error(&lead.id, &campaign.id, "openai: 429")
            .await
            .unwrap();
        let job = storage.get_enrichment_job(&lead.id).await.unwrap().unwrap();
        assert_eq!(job.error.as_deref(), Some("openai: 429"));
    }

    #[tokio::test]
    async fn stats_count_present_values() {
        let (storage, campaign) = seeded().await;
        add_lead(&storage, &campaign, |l| {
            l.email = Some("a@x.test".into());
            l.company_website = Some("x.test".into());
        })
        .await;
        add_lead(&storage, &campaign, |l| {
            l.email = Some("  ".into());
            l.decision_maker_name = Some("Dana".into());
        })
        .await;
        let validated = add_lead(&storage, &campaign, |l| {
            l.company_website = Some("y.test".into());
        })
        .await;
        storage
            .set_enrichment_flags(&validated.id, &EnrichmentFlags { website_validated: true })
            .await
            .unwrap();

        let stats = storage.lead_stats(&campaign.id).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.with_email, 1);
        assert_eq!(stats.without_email(), 2);
        assert_eq!(stats.with_website, 2);
        assert_eq!(stats.with_decision_maker, 1);
        assert_eq!(stats.without_decision_maker(), 2);
        assert_eq!(stats.validated, 1);
        assert_eq!(stats.with_icebreaker, 0);
    }

    #[tokio::test]
    async fn verification_bulk_update() {
        let (storage, campaign) = seeded().await;
        let a = add_lead(&storage, &campaign, |l| l.email = Some("a@x.test".into())).await;
        let b = add_lead(&storage, &campaign, |l| l.email = Some("b@x.test".into())).await;
        add_lead(&storage, &campaign, |_| {}).await;

        let page = storage.page_lead_emails(&campaign.id, 10, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        let second_page = storage.page_lead_emails(&campaign.id, 1, 1).await.unwrap();
        assert_eq!(second_page.len(), 1);

        let updated = storage
            .set_verification_status(
                &[a.id.clone(), b.id.clone()],
                VerificationStatus::VerifiedBad,
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(updated, 2);
        let a = storage.get_lead(&a.id).await.unwrap().unwrap();
        assert_eq!(a.verification_status, VerificationStatus::VerifiedBad);
        assert!(a.verification_checked_at.is_some());

        assert_eq!(
            storage
                .set_verification_status(&[], VerificationStatus::VerifiedOk, Utc::now())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn casual_name_candidates() {
        let (storage, campaign) = seeded().await;
        let lead = add_lead(&storage, &campaign, |l| l.company_name = Some("Acme LLC".into())).await;
        add_lead(&storage, &campaign, |l| {
            l.company_name = Some("Done Co".into());
            l.company_name_casual = Some("Done".into());
        })
        .await;
        add_lead(&storage, &campaign, |_| {}).await;

        let todo = storage.leads_missing_casual_name(&campaign.id, 500).await.unwrap();
        assert_eq!(todo, vec![(lead.id.clone(), "Acme LLC".to_string())]);

        storage.set_casual_name(&lead.id, "Acme").await.unwrap();
        assert!(storage.leads_missing_casual_name(&campaign.id, 500).await.unwrap().is_empty());
    }
}
