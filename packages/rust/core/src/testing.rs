//! In-memory doubles behind the same traits the production clients implement.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use leadsmith_crawler::PageSource;
use leadsmith_llm::{ChatMessage, ChatModel, ChatRequest, FunctionCall, ToolCall};
use leadsmith_shared::{Campaign, Lead, LeadsmithError, Result};
use leadsmith_storage::Storage;

use crate::verification::{FileInfo, ResultRow, VerificationApi};

pub async fn test_storage() -> Storage {
    test_storage_at().await.0
}

/// A fresh test database along with its file path.
pub async fn test_storage_at() -> (Storage, PathBuf) {
    let tmp = std::env::temp_dir().join(format!("ls_core_test_{}.db", Uuid::now_v7()));
    let storage = Storage::open(&tmp).await.expect("open test db");
    (storage, tmp)
}

/// A second connection to a test database, for installing triggers that
/// make specific statements fail.
pub struct SideConnection {
    _db: libsql::Database,
    conn: libsql::Connection,
}

impl SideConnection {
    pub async fn open(path: &Path) -> Self {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .expect("open side db");
        let conn = db.connect().expect("connect side db");
        Self { _db: db, conn }
    }

    pub async fn exec(&self, sql: &str) {
        self.conn.execute_batch(sql).await.expect("side statement");
    }
}

pub fn campaign(customer_id: &str) -> Campaign {
    Campaign {
        id: Uuid::now_v7().to_string(),
        customer_id: customer_id.into(),
        name: "Austin roofers".into(),
        service_line: "roof inspections".into(),
        summarize_prompt: String::new(),
        icebreaker_prompt: "Write one line about {serviceLine}.".into(),
        status: "active".into(),
        created_at: Utc::now(),
    }
}

/// Storage with one `tenant-1` campaign inserted.
pub async fn seeded() -> (Storage, Campaign) {
    let (storage, campaign, _) = seeded_at().await;
    (storage, campaign)
}

/// [`seeded`] plus the database path.
pub async fn seeded_at() -> (Storage, Campaign, PathBuf) {
    let (storage, path) = test_storage_at().await;
    let campaign = campaign("tenant-1");
    storage.insert_campaign(&campaign).await.expect("insert campaign");
    (storage, campaign, path)
}

pub async fn add_lead(storage: &Storage, campaign: &Campaign, edit: impl FnOnce(&mut Lead)) -> Lead {
    let mut lead = Lead::new(&campaign.id, &campaign.customer_id);
    edit(&mut lead);
    storage.insert_lead(&lead).await.expect("insert lead");
    lead
}

/// `{"abstract": text}` as the model would return it.
pub fn summary_reply(text: &str) -> String {
    json!({ "abstract": text }).to_string()
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// Serves fixed HTML by exact URL; anything else is a network error.
#[derive(Default)]
pub struct StaticPages {
    pages: HashMap<String, String>,
    fetched: Mutex<Vec<String>>,
}

impl StaticPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    pub fn was_fetched(&self, url: &str) -> bool {
        self.fetched.lock().unwrap().iter().any(|u| u == url)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

#[async_trait]
impl PageSource for StaticPages {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| LeadsmithError::Network(format!("fetch {url}: HTTP 404")))
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Answers requests from a script, in order, and records every request.
/// Once the script runs out every call fails with an `Llm` error.
pub struct ScriptedChat {
    replies: Mutex<Vec<ChatMessage>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    /// Plain assistant replies.
    pub fn new(replies: Vec<String>) -> Self {
        Self::with_messages(replies.into_iter().map(ChatMessage::assistant).collect())
    }

    pub fn with_messages(mut replies: Vec<ChatMessage>) -> Self {
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| LeadsmithError::Llm("HTTP 500: script exhausted".into()))
    }
}

/// An assistant turn requesting one tool call.
pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ChatMessage {
    ChatMessage {
        content: None,
        tool_calls: vec![ToolCall {
            id: id.into(),
            kind: "function".into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.to_string(),
            },
        }],
        ..ChatMessage::assistant("")
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Provider double keyed by file id.
#[derive(Default)]
pub struct FakeVerifier {
    infos: HashMap<String, FileInfo>,
    results: HashMap<String, Vec<ResultRow>>,
    downloads: Mutex<Vec<String>>,
}

impl FakeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, file_id: &str, info: FileInfo, rows: &[(&str, &str, &str)]) -> Self {
        self.infos.insert(file_id.into(), info);
        self.results.insert(
            file_id.into(),
            rows.iter()
                .map(|(email, quality, result)| ResultRow {
                    email: email.to_string(),
                    quality: quality.to_string(),
                    result: result.to_string(),
                })
                .collect(),
        );
        self
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl VerificationApi for FakeVerifier {
    async fn file_info(&self, file_id: &str) -> Result<FileInfo> {
        self.infos
            .get(file_id)
            .cloned()
            .ok_or_else(|| LeadsmithError::Verification(format!("fileinfo {file_id}: HTTP 404")))
    }

    async fn download_results(&self, file_id: &str) -> Result<Vec<ResultRow>> {
        self.downloads.lock().unwrap().push(file_id.to_string());
        self.results
            .get(file_id)
            .cloned()
            .ok_or_else(|| LeadsmithError::Verification(format!("download {file_id}: HTTP 404")))
    }
}
