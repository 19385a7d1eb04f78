//! GitHub code search
//!
//! Only what the generator needs: repository search ordered by stars,
//! root directory listings, and raw file contents.

#![allow(dead_code)]

use crate::config::GitHubConfig;
use crate::error::GitHubError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

/// Repository as returned by search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repository {
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// One entry of a directory listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ContentEntry {
    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    items: Vec<Repository>,
}

/// Source of example code
#[async_trait]
pub trait CodeSearch: Send + Sync {
    async fn search_repositories(&self, query: &str) -> Result<Vec<Repository>, GitHubError>;

    /// Entries in the repository's root directory
    async fn list_files(&self, repo: &Repository) -> Result<Vec<ContentEntry>, GitHubError>;

    /// Raw text of one file
    async fn fetch_file(&self, repo: &Repository, path: &str) -> Result<String, GitHubError>;
}

pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    per_page: u32,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: Option<String>) -> Result<Self, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| GitHubError::Network(format!("invalid token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("agentforge/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            per_page: config.per_page,
        })
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, GitHubError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(GitHubError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn contents_url(&self, repo: &Repository, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_base,
            repo.full_name,
            path.trim_start_matches('/')
        )
    }

    fn branch_query(repo: &Repository) -> Vec<(&'static str, String)> {
        repo.default_branch
            .iter()
            .map(|branch| ("ref", branch.clone()))
            .collect()
    }
}

#[async_trait]
impl CodeSearch for GitHubClient {
    async fn search_repositories(&self, query: &str) -> Result<Vec<Repository>, GitHubError> {
        info!("Searching repositories: {}", query);
        let per_page = self.per_page.to_string();
        let response = self
            .http
            .get(format!("{}/search/repositories", self.api_base))
            .query(&[
                ("q", query),
                ("sort", "stars"),
                ("order", "desc"),
                ("per_page", per_page.as_str()),
            ])
            .send()
            .await?;

        let results: SearchResponse = Self::checked(response).await?.json().await?;
        debug!(
            "Repository search: {} total, {} returned",
            results.total_count,
            results.items.len()
        );
        Ok(results.items)
    }

    async fn list_files(&self, repo: &Repository) -> Result<Vec<ContentEntry>, GitHubError> {
        debug!("Listing root of {}", repo.full_name);
        let response = self
            .http
            .get(self.contents_url(repo, ""))
            .query(&Self::branch_query(repo))
            .send()
            .await?;

        Ok(Self::checked(response).await?.json().await?)
    }

    async fn fetch_file(&self, repo: &Repository, path: &str) -> Result<String, GitHubError> {
        debug!("Fetching {}/{}", repo.full_name, path);
        let response = self
            .http
            .get(self.contents_url(repo, path))
            .query(&Self::branch_query(repo))
            .header(ACCEPT, RAW_MEDIA_TYPE)
            .send()
            .await?;

        Ok(Self::checked(response).await?.text().await?)
    }
}
