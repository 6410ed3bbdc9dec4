use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::CommitId;
use crate::config::ForgeConfig;

const USER_AGENT: &str = concat!("kd/", env!("CARGO_PKG_VERSION"));
const GITHUB_JSON: &str = "application/vnd.github+json";

/// Transport and HTTP failures raised while talking to the forge.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("{url} was not found (HTTP {status})")]
    NotFound { url: String, status: u16 },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to fetch {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl ForgeError {
    /// Whether the forge answered with a "not found"-class status.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::Transport { .. } | Self::Decode { .. } => None,
        }
    }

    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => {
                Some("Use a branch name or commit SHA and not a tag in the URL, and check the repository is public.")
            }
            Self::Status { status: 403 | 429, .. } => {
                Some("The forge is rate limiting requests; set GITHUB_TOKEN or retry later.")
            }
            Self::Status { .. } | Self::Transport { .. } => {
                Some("Check network connectivity and that the forge is reachable.")
            }
            Self::Decode { .. } => None,
        }
    }
}

/// The two forge endpoints the pipeline needs.
pub trait ForgeApi: Send + Sync {
    /// Commit SHA the branch `branch` currently points at.
    fn branch_head(&self, owner: &str, repo: &str, branch: &str) -> Result<String, ForgeError>;

    /// Full repository snapshot at `commit`, as zip bytes.
    fn download_archive(
        &self,
        owner: &str,
        repo: &str,
        commit: &CommitId,
    ) -> Result<Vec<u8>, ForgeError>;
}

#[derive(Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

/// Blocking GitHub REST client.
#[derive(Debug, Clone)]
pub struct GithubApi {
    client: Client,
    api_base: Url,
    token: Option<String>,
}

impl GithubApi {
    /// Build a client from forge settings.
    ///
    /// # Errors
    ///
    /// Returns an error when the TLS backend or proxy configuration cannot be initialised.
    pub fn new(config: &ForgeConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|err| anyhow::anyhow!("failed to build http client: {err}"))?;
        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            token: config.token.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ForgeError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| ForgeError::Decode {
                url: self.api_base.to_string(),
                reason: "API base cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: &Url) -> Result<Response, ForgeError> {
        let mut request = self.client.get(url.clone()).header(ACCEPT, GITHUB_JSON);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().map_err(|source| ForgeError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        debug!(%url, status = status.as_u16(), "forge response");
        if status.is_success() {
            Ok(response)
        } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            Err(ForgeError::NotFound {
                url: url.to_string(),
                status: status.as_u16(),
            })
        } else {
            Err(ForgeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

impl ForgeApi for GithubApi {
    fn branch_head(&self, owner: &str, repo: &str, branch: &str) -> Result<String, ForgeError> {
        let mut segments = vec!["repos", owner, repo, "git", "ref", "heads"];
        segments.extend(branch.split('/').filter(|part| !part.is_empty()));
        let url = self.endpoint(&segments)?;
        let payload: RefResponse = self.get(&url)?.json().map_err(|err| ForgeError::Decode {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        Ok(payload.object.sha)
    }

    fn download_archive(
        &self,
        owner: &str,
        repo: &str,
        commit: &CommitId,
    ) -> Result<Vec<u8>, ForgeError> {
        let url = self.endpoint(&["repos", owner, repo, "zipball", commit.as_str()])?;
        let bytes = self
            .get(&url)?
            .bytes()
            .map_err(|source| ForgeError::Transport {
                url: url.to_string(),
                source,
            })?;
        debug!(%url, size = bytes.len(), "downloaded repository archive");
        Ok(bytes.to_vec())
    }
}
