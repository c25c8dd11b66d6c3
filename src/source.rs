//! Source Browser capability: repository tree, file contents, README and
//! language statistics, plus the GitHub REST adapter used in production.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::config::GitHubConfig;
use crate::error::SourceError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Blob,
    Tree,
    Commit,
}

/// One entry of a repository's file tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub size: Option<u64>,
}

/// Contents of one requested path; `None` when that path could not be fetched.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub path: String,
    pub content: Option<String>,
}

#[async_trait]
pub trait SourceBrowser: Send + Sync {
    async fn list_tree(&self, full_name: &str) -> Result<Vec<TreeEntry>, SourceError>;

    /// Fetch several files. A failing path yields `content: None`; only a
    /// failure of the whole request is an error.
    async fn get_file_contents(
        &self,
        full_name: &str,
        paths: &[String],
    ) -> Result<Vec<FileContent>, SourceError>;

    async fn get_readme(&self, full_name: &str) -> Result<Option<String>, SourceError>;

    /// Bytes of code per language, as reported by the host.
    async fn get_language_stats(
        &self,
        full_name: &str,
    ) -> Result<BTreeMap<String, u64>, SourceError>;
}

/// Source Browser over the GitHub REST API.
pub struct GitHubBrowser {
    client: reqwest::Client,
    config: GitHubConfig,
}

#[derive(Deserialize)]
struct GitTreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

impl GitHubBrowser {
    pub fn new(client: reqwest::Client, config: GitHubConfig) -> Self {
        Self { client, config }
    }

    /// `{api_url}/repos/{owner}/{name}/{tail...}` with every segment
    /// percent-encoded, so `#`, `?` and spaces in file paths stay in the path.
    fn endpoint(&self, full_name: &str, tail: &[&str]) -> Result<Url, SourceError> {
        let invalid = |message: String| SourceError::Request {
            url: self.config.api_url.clone(),
            message,
        };
        let mut url = Url::parse(&self.config.api_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("API URL cannot take a path".to_string()))?
            .pop_if_empty()
            .push("repos")
            .extend(full_name.split('/'))
            .extend(tail);
        Ok(url)
    }

    fn contents_url(&self, full_name: &str, path: &str) -> Result<Url, SourceError> {
        let mut tail = vec!["contents"];
        tail.extend(path.split('/').filter(|segment| !segment.is_empty()));
        self.endpoint(full_name, &tail)
    }

    fn request(&self, url: &Url, accept: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .get(url.clone())
            .header("Accept", accept)
            .header("User-Agent", "repo-insight")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.config.token {
            Some(token) => req.header("Authorization", format!("Bearer {token}")),
            None => req,
        }
    }

    async fn get_raw(&self, url: &Url) -> Result<Option<String>, SourceError> {
        let resp = self
            .request(url, "application/vnd.github.raw+json")
            .send()
            .await
            .map_err(|e| SourceError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        resp.text().await.map(Some).map_err(|e| SourceError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &Url) -> Result<T, SourceError> {
        let resp = self
            .request(url, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| SourceError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        resp.json().await.map_err(|e| SourceError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl SourceBrowser for GitHubBrowser {
    async fn list_tree(&self, full_name: &str) -> Result<Vec<TreeEntry>, SourceError> {
        let mut url = self.endpoint(full_name, &["git", "trees", "HEAD"])?;
        url.query_pairs_mut().append_pair("recursive", "1");
        let body: GitTreeResponse = self.get_json(&url).await?;
        if body.truncated {
            tracing::warn!(
                "Tree for {full_name} was truncated by the host ({} entries returned)",
                body.tree.len()
            );
        }
        Ok(body.tree)
    }

    async fn get_file_contents(
        &self,
        full_name: &str,
        paths: &[String],
    ) -> Result<Vec<FileContent>, SourceError> {
        let fetches = paths.iter().map(|path| async move {
            let fetched = match self.contents_url(full_name, path) {
                Ok(url) => self.get_raw(&url).await,
                Err(e) => Err(e),
            };
            let content = match fetched {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Skipping {path} in {full_name}: {e}");
                    None
                }
            };
            FileContent {
                path: path.clone(),
                content,
            }
        });
        Ok(join_all(fetches).await)
    }

    async fn get_readme(&self, full_name: &str) -> Result<Option<String>, SourceError> {
        let url = self.endpoint(full_name, &["readme"])?;
        self.get_raw(&url).await
    }

    async fn get_language_stats(
        &self,
        full_name: &str,
    ) -> Result<BTreeMap<String, u64>, SourceError> {
        let url = self.endpoint(full_name, &["languages"])?;
        self.get_json(&url).await
    }
}
