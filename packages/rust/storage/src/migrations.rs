//! SQL migration definitions for the Leadsmith database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: campaigns, leads, enrichment queue, error ledger",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS campaigns (
    id                 TEXT PRIMARY KEY,
    customer_id        TEXT NOT NULL,
    name               TEXT NOT NULL,
    service_line       TEXT NOT NULL DEFAULT '',
    summarize_prompt   TEXT NOT NULL DEFAULT '',
    icebreaker_prompt  TEXT NOT NULL DEFAULT '',
    status             TEXT NOT NULL DEFAULT 'active',
    created_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_campaigns_customer ON campaigns(customer_id);

CREATE TABLE IF NOT EXISTS leads (
    id                       TEXT PRIMARY KEY,
    campaign_id              TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
    customer_id              TEXT NOT NULL,
    company_name             TEXT,
    company_website          TEXT,
    company_name_casual      TEXT,
    email                    TEXT,
    personal_email           TEXT,
    phone                    TEXT,
    full_name                TEXT,
    first_name               TEXT,
    last_name                TEXT,
    title                    TEXT,
    industry                 TEXT,
    city                     TEXT,
    state                    TEXT,
    country                  TEXT,
    raw                      TEXT,
    decision_maker_name      TEXT,
    decision_maker_title     TEXT,
    decision_maker_email     TEXT,
    decision_maker_linkedin  TEXT,
    ice_breaker              TEXT,
    ice_status               TEXT NOT NULL DEFAULT 'pending',
    enriched_at              TEXT,
    verification_status      TEXT NOT NULL DEFAULT 'unverified',
    verification_checked_at  TEXT,
    enrichment_status        TEXT NOT NULL DEFAULT '{}',
    created_at               TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_leads_campaign ON leads(campaign_id);
CREATE INDEX IF NOT EXISTS idx_leads_ice_status ON leads(campaign_id, ice_status);

-- Per-lead enrichment backlog. A row is visible once vt_ms <= now.
CREATE TABLE IF NOT EXISTS lead_enrichment_queue (
    msg_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    lead_id     TEXT NOT NULL,
    campaign_id TEXT NOT NULL,
    vt_ms       INTEGER NOT NULL,
    read_ct     INTEGER NOT NULL DEFAULT 0,
    enqueued_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queue_vt ON lead_enrichment_queue(vt_ms);

-- Most recent enrichment failure per lead
CREATE TABLE IF NOT EXISTS enrichment_jobs (
    lead_id     TEXT PRIMARY KEY,
    campaign_id TEXT NOT NULL,
    status      TEXT NOT NULL,
    error       TEXT,
    updated_at  TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Email verification files and bulk pipeline jobs",
            sql: r#"
CREATE TABLE IF NOT EXISTS email_verification_files (
    id              TEXT PRIMARY KEY,
    campaign_id     TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
    file_id         TEXT NOT NULL,
    emails          TEXT NOT NULL DEFAULT '[]',
    lines           INTEGER,
    lines_processed INTEGER,
    processed       INTEGER NOT NULL DEFAULT 0,
    status          TEXT,
    checked_at      TEXT,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_verification_pending
    ON email_verification_files(processed, created_at);

CREATE TABLE IF NOT EXISTS bulk_jobs (
    id          TEXT PRIMARY KEY,
    campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
    type        TEXT NOT NULL,
    config      TEXT NOT NULL DEFAULT '{}',
    status      TEXT NOT NULL DEFAULT 'pending',
    progress    INTEGER NOT NULL DEFAULT 0,
    error       TEXT,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bulk_jobs_campaign ON bulk_jobs(campaign_id, created_at);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
