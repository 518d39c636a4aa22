// Librarian HTTP client
//
// Two calls: an instance search by file name, and a streamed file upload.
// The search comes first on every item so re-delivered queue entries are
// detected instead of stored twice.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use corrflow_core::error::{AppError, Result};
use corrflow_core::port::ArchiveClient;

/// Instance searches walk the archive's file table; generous timeout
const SEARCH_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct LibrarianConfig {
    pub base_url: String,
    /// Connection name recorded with each upload
    pub connection_name: String,
    pub auth_token: Option<String>,
}

impl LibrarianConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connection_name: "local-rtp".to_string(),
            auth_token: None,
        }
    }
}

#[derive(Serialize)]
struct SearchRequest {
    search: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<serde_json::Value>,
}

pub struct LibrarianClient {
    http: reqwest::Client,
    config: LibrarianConfig,
}

impl LibrarianClient {
    pub fn new(config: LibrarianConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .build()
            .map_err(|e| AppError::Archive(format!("http client: {e}")))?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl ArchiveClient for LibrarianClient {
    async fn has_instance(&self, file_name: &str) -> Result<bool> {
        let query = json!({ "name-matches": file_name }).to_string();
        let request = self
            .http
            .post(self.url("api/v1/search_instances"))
            .json(&SearchRequest { search: query });

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| AppError::Archive(format!("instance search failed: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::Archive(format!("instance search rejected: {e}")))?
            .json::<SearchResponse>()
            .await
            .map_err(|e| AppError::Archive(format!("bad search response: {e}")))?;

        debug!(
            file = file_name,
            instances = response.results.len(),
            "instance search"
        );
        Ok(!response.results.is_empty())
    }

    async fn upload(&self, local_path: &Path, store_name: &str) -> Result<()> {
        let file = tokio::fs::File::open(local_path).await.map_err(|e| {
            AppError::Archive(format!("cannot open {}: {e}", local_path.display()))
        })?;
        let size = file
            .metadata()
            .await
            .map_err(|e| AppError::Archive(format!("stat failed: {e}")))?
            .len();

        let request = self
            .http
            .post(self.url("api/v1/upload"))
            .query(&[
                ("name", store_name),
                ("connection", self.config.connection_name.as_str()),
            ])
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(reqwest::Body::from(file));

        self.authorize(request)
            .send()
            .await
            .map_err(|e| AppError::Archive(format!("upload failed: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::Archive(format!("upload rejected: {e}")))?;

        info!(file = store_name, size, "uploaded");
        Ok(())
    }
}
