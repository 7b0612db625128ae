//! MillionVerifier bulk API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use leadsmith_shared::{LeadsmithError, Result, VerifierConfig};

use super::{FileInfo, ResultRow, VerificationApi};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct MillionVerifierClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl MillionVerifierClient {
    pub fn new(config: &VerifierConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LeadsmithError::Verification(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_fileinfo(&self, id_param: &str, file_id: &str) -> Result<reqwest::Response> {
        self.client
            .get(format!("{}/fileinfo", self.base_url))
            .query(&[("key", self.api_key.as_str()), (id_param, file_id)])
            .send()
            .await
            .map_err(|e| LeadsmithError::Verification(format!("fileinfo {file_id}: {e}")))
    }
}

#[async_trait]
impl VerificationApi for MillionVerifierClient {
    /// Looks the file up by `file_id`, then once more by `id` when the
    /// first form is answered with 404.
    #[instrument(skip(self))]
    async fn file_info(&self, file_id: &str) -> Result<FileInfo> {
        let file_id = file_id.trim();
        let mut response = self.get_fileinfo("file_id", file_id).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("fileinfo 404, retrying with id parameter");
            response = self.get_fileinfo("id", file_id).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(LeadsmithError::Verification(format!(
                "fileinfo {file_id}: HTTP {}",
                status.as_u16()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LeadsmithError::Verification(format!("fileinfo {file_id}: {e}")))?;
        if body.get("status").is_none() {
            if let Some(error) = body.get("error").and_then(Value::as_str) {
                return Err(LeadsmithError::Verification(format!("fileinfo {file_id}: {error}")));
            }
        }

        Ok(FileInfo {
            status: body.get("status").and_then(Value::as_str).map(String::from),
            lines: body.get("lines").and_then(as_count),
            lines_processed: body.get("lines_processed").and_then(as_count),
        })
    }

    #[instrument(skip(self))]
    async fn download_results(&self, file_id: &str) -> Result<Vec<ResultRow>> {
        let response = self
            .client
            .get(format!("{}/download", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("file_id", file_id.trim()),
                ("filter", "all"),
            ])
            .send()
            .await
            .map_err(|e| LeadsmithError::Verification(format!("download {file_id}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LeadsmithError::Verification(format!(
                "download {file_id}: HTTP {}",
                status.as_u16()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| LeadsmithError::Verification(format!("download {file_id}: {e}")))?;
        let rows = parse_results_csv(&text)?;
        debug!(rows = rows.len(), "results parsed");
        Ok(rows)
    }
}

/// Counters arrive as numbers or numeric strings.
fn as_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    email: usize,
    quality: Option<usize>,
    result: Option<usize>,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            email: 0,
            quality: Some(1),
            result: Some(2),
        }
    }
}

impl Columns {
    /// Column positions from a header row, if `record` is one.
    fn from_header(record: &csv::StringRecord) -> Option<Self> {
        let position = |name: &str| record.iter().position(|h| h.eq_ignore_ascii_case(name));
        Some(Self {
            email: position("email")?,
            quality: position("quality"),
            result: position("result"),
        })
    }
}

/// Parse the `filter=all` export: `email,quality,result` plus whatever
/// other columns the provider adds.
///
/// A header row is recognised by an `email` column; without one the first
/// three columns are taken positionally. Rows whose email has no `@` are
/// dropped.
pub fn parse_results_csv(text: &str) -> Result<Vec<ResultRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut columns: Option<Columns> = None;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| LeadsmithError::parse(format!("verification results csv: {e}")))?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let cols = match columns {
            Some(cols) => cols,
            None => {
                if let Some(header) = Columns::from_header(&record) {
                    columns = Some(header);
                    continue;
                }
                warn!("results csv has no header row, assuming email,quality,result");
                *columns.insert(Columns::default())
            }
        };

        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(|v| v.trim().to_lowercase())
                .unwrap_or_default()
        };
        let email = field(Some(cols.email));
        if !email.contains('@') {
            continue;
        }
        rows.push(ResultRow {
            email,
            quality: field(cols.quality),
            result: field(cols.result),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> MillionVerifierClient {
        let config = VerifierConfig {
            base_url: format!("{}/bulkapi/v2", server.uri()),
            ..VerifierConfig::default()
        };
        MillionVerifierClient::new(&config, "k-1".into()).unwrap()
    }

    #[test]
    fn csv_with_header_and_quotes() {
        let text = "\"email\",\"quality\",\"result\",\"free\"\r\n\
                    \"John@Example.com\",\"good\",\"ok\",\"no\"\r\n\
                    \"x, y\",\"bad\",\"invalid\",\"no\"\r\n\
                    \r\n\
                    amy@acme.test,Risky,Catch_All,yes\n";
        let rows = parse_results_csv(text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].email, "john@example.com");
        assert_eq!((rows[0].quality.as_str(), rows[0].result.as_str()), ("good", "ok"));
        assert_eq!(rows[1].quality, "risky");
        assert_eq!(rows[1].result, "catch_all");
    }

    #[test]
    fn csv_header_in_other_order_and_missing_columns() {
        let rows = parse_results_csv("result,EMAIL\nok,a@x.test\n").unwrap();
        assert_eq!(rows[0].email, "a@x.test");
        assert_eq!(rows[0].result, "ok");
        assert_eq!(rows[0].quality, "");
    }

    #[test]
    fn csv_without_header_is_positional() {
        let rows = parse_results_csv("a@x.test,good,ok\nb@x.test,bad\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].quality, "bad");
        assert_eq!(rows[1].result, "");
        assert!(parse_results_csv("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn fileinfo_retries_with_id_param_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bulkapi/v2/fileinfo"))
            .and(query_param("file_id", "f-1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bulkapi/v2/fileinfo"))
            .and(query_param("id", "f-1"))
            .and(query_param("key", "k-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "file_id": "f-1", "status": "in_progress", "lines": "3", "lines_processed": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let info = client_for(&server).file_info("f-1").await.unwrap();
        assert_eq!(info.status.as_deref(), Some("in_progress"));
        assert_eq!(info.lines, Some(3));
        assert_eq!(info.lines_processed, Some(1));
    }

    #[tokio::test]
    async fn fileinfo_error_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bulkapi/v2/fileinfo"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": "Invalid key"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).file_info("f-1").await.unwrap_err();
        assert!(err.to_string().contains("Invalid key"));
    }

    #[tokio::test]
    async fn download_requests_all_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bulkapi/v2/download"))
            .and(query_param("file_id", "f-1"))
            .and(query_param("filter", "all"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("email,quality,result\na@x.test,good,ok\n"),
            )
            .mount(&server)
            .await;

        let rows = client_for(&server).download_results("f-1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].email, "a@x.test");
    }
}
