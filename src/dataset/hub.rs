//! Hugging Face Hub access over plain HTTP.
//!
//! Loading goes through the datasets-server parquet export: one listing call,
//! then every shard of the wanted splits is downloaded to a temporary
//! directory and read like a local parquet file. Pushing creates the dataset
//! repo if needed and commits one JSON Lines file per split in a single
//! commit.
//!
//! Files are committed inline (base64 in the commit payload); there is no
//! LFS upload path, so very large splits will be refused by the Hub.

use crate::error::DocprepError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Default Hub endpoint, overridden by `HF_ENDPOINT`.
pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// Parquet export service for hub datasets.
pub const DATASETS_SERVER: &str = "https://datasets-server.huggingface.co";

const HUB_TIMEOUT_SECS: u64 = 300;

/// One parquet shard of a hub dataset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParquetShard {
    pub config: String,
    pub split: String,
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Deserialize)]
struct ParquetListing {
    parquet_files: Vec<ParquetShard>,
}

/// Minimal client for the datasets-server and the Hub commit API.
#[derive(Debug, Clone)]
pub struct HubClient {
    client: reqwest::Client,
    endpoint: String,
    datasets_server: String,
    token: Option<String>,
}

impl HubClient {
    /// Build a client from `HF_ENDPOINT` and `HF_TOKEN` /
    /// `HUGGING_FACE_HUB_TOKEN`.
    pub fn from_env() -> Result<Self, DocprepError> {
        let endpoint = std::env::var("HF_ENDPOINT")
            .ok()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_HUB_ENDPOINT.to_string());
        let token = ["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"]
            .iter()
            .find_map(|k| std::env::var(k).ok().filter(|t| !t.is_empty()));
        Self::new(endpoint, DATASETS_SERVER, token)
    }

    pub fn new(
        endpoint: impl Into<String>,
        datasets_server: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, DocprepError> {
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HUB_TIMEOUT_SECS))
            .build()
            .map_err(|e| DocprepError::HubRequest {
                url: endpoint.clone(),
                detail: e.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            datasets_server: datasets_server.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// List the parquet shards of `dataset` (`org/repo`), restricted to one
    /// config: `default` when present, otherwise the first one listed.
    pub async fn parquet_shards(&self, dataset: &str) -> Result<Vec<ParquetShard>, DocprepError> {
        let url = format!("{}/parquet", self.datasets_server);
        info!("Listing parquet export for {}", dataset);

        let response = self
            .authed(self.client.get(&url).query(&[("dataset", dataset)]))
            .send()
            .await
            .map_err(|e| hub_error(&url, e))?;
        let response = check_status(&url, response).await?;
        let listing: ParquetListing = response.json().await.map_err(|e| hub_error(&url, e))?;

        Ok(select_config(listing.parquet_files))
    }

    /// Download `url` to `dest`.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<(), DocprepError> {
        debug!("Downloading {} → {}", url, dest.display());
        let response = self
            .authed(self.client.get(url))
            .send()
            .await
            .map_err(|e| hub_error(url, e))?;
        let response = check_status(url, response).await?;
        let bytes = response.bytes().await.map_err(|e| hub_error(url, e))?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| DocprepError::write(dest, e))
    }

    pub(crate) fn require_token(&self) -> Result<&str, DocprepError> {
        self.token.as_deref().ok_or_else(|| DocprepError::HubRequest {
            url: self.endpoint.clone(),
            detail: "pushing requires a token; set HF_TOKEN".into(),
        })
    }

    /// Create the dataset repo `repo_id`. An existing repo is fine.
    pub async fn create_dataset_repo(&self, repo_id: &str) -> Result<(), DocprepError> {
        let token = self.require_token()?;
        let url = format!("{}/api/repos/create", self.endpoint);
        let (organization, name) = repo_parts(repo_id);

        let mut body = json!({ "type": "dataset", "name": name });
        if let Some(org) = organization {
            body["organization"] = json!(org);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| hub_error(&url, e))?;

        if response.status() == StatusCode::CONFLICT {
            debug!("Dataset repo {} already exists", repo_id);
            return Ok(());
        }
        check_status(&url, response).await?;
        info!("Created dataset repo {}", repo_id);
        Ok(())
    }

    /// Commit `files` (repo path, contents) to the `main` branch of
    /// `repo_id` in one commit.
    pub async fn commit_files(
        &self,
        repo_id: &str,
        files: &[(String, Vec<u8>)],
        summary: &str,
    ) -> Result<(), DocprepError> {
        let token = self.require_token()?;
        let url = format!("{}/api/datasets/{}/commit/main", self.endpoint, repo_id);
        let payload = commit_payload(summary, files);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(payload)
            .send()
            .await
            .map_err(|e| hub_error(&url, e))?;
        check_status(&url, response).await?;

        info!("Committed {} file(s) to {}", files.len(), repo_id);
        Ok(())
    }
}

fn hub_error(url: &str, e: reqwest::Error) -> DocprepError {
    DocprepError::HubRequest {
        url: url.to_string(),
        detail: e.to_string(),
    }
}

async fn check_status(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, DocprepError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DocprepError::HubRequest {
        url: url.to_string(),
        detail: format!("HTTP {}: {}", status, body.trim()),
    })
}

/// Keep the shards of the `default` config, or of the first config listed.
fn select_config(shards: Vec<ParquetShard>) -> Vec<ParquetShard> {
    let wanted = if shards.iter().any(|s| s.config == "default") {
        "default".to_string()
    } else {
        match shards.first() {
            Some(s) => s.config.clone(),
            None => return shards,
        }
    };
    shards.into_iter().filter(|s| s.config == wanted).collect()
}

/// Split `org/repo` into its parts; a bare name has no organization.
fn repo_parts(repo_id: &str) -> (Option<&str>, &str) {
    match repo_id.split_once('/') {
        Some((org, name)) => (Some(org), name),
        None => (None, repo_id),
    }
}

/// NDJSON body of a commit: one header line, then one line per file.
fn commit_payload(summary: &str, files: &[(String, Vec<u8>)]) -> String {
    let mut lines = Vec::with_capacity(files.len() + 1);
    lines.push(json!({ "key": "header", "value": { "summary": summary, "description": "" } }));
    for (path, contents) in files {
        lines.push(json!({
            "key": "file",
            "value": { "path": path, "content": STANDARD.encode(contents), "encoding": "base64" }
        }));
    }
    lines
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard(config: &str, split: &str) -> ParquetShard {
        ParquetShard {
            config: config.into(),
            split: split.into(),
            url: format!("https://x/{config}/{split}/0000.parquet"),
            filename: "0000.parquet".into(),
        }
    }

    #[test]
    fn default_config_wins() {
        let picked = select_config(vec![
            shard("extra", "train"),
            shard("default", "train"),
            shard("default", "test"),
        ]);
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|s| s.config == "default"));
    }

    #[test]
    fn first_config_without_default() {
        let picked = select_config(vec![shard("en", "train"), shard("fr", "train")]);
        assert_eq!(picked, vec![shard("en", "train")]);
        assert!(select_config(vec![]).is_empty());
    }

    #[test]
    fn listing_parses() {
        let body = r#"{"parquet_files":[{"dataset":"org/chats","config":"default","split":"train",
            "url":"https://h/0.parquet","filename":"0000.parquet","size":10}],
            "pending":[],"failed":[],"partial":false}"#;
        let listing: ParquetListing = serde_json::from_str(body).unwrap();
        assert_eq!(listing.parquet_files[0].split, "train");
    }

    #[test]
    fn repo_ids_split() {
        assert_eq!(repo_parts("org/chats"), (Some("org"), "chats"));
        assert_eq!(repo_parts("chats"), (None, "chats"));
    }

    #[test]
    fn commit_payload_is_ndjson() {
        let payload = commit_payload("Add data", &[("data/train.jsonl".into(), b"{}\n".to_vec())]);
        let lines: Vec<serde_json::Value> = payload
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["key"], "header");
        assert_eq!(lines[0]["value"]["summary"], "Add data");
        assert_eq!(lines[1]["value"]["path"], "data/train.jsonl");
        assert_eq!(lines[1]["value"]["content"], "e30K");
    }

    #[tokio::test]
    async fn push_without_token_fails_fast() {
        let client = HubClient::new("http://127.0.0.1:9", DATASETS_SERVER, None).unwrap();
        let err = client.create_dataset_repo("org/chats").await.unwrap_err();
        assert!(err.to_string().contains("HF_TOKEN"), "got {err}");
    }
}
