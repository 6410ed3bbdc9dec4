use std::collections::HashMap;
use std::env;
use std::time::Duration;

use anyhow::Context;
use tracing::warn;
use url::Url;

pub const DEFAULT_WEB_HOST: &str = "github.com";
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SNAPSHOT_CAPACITY: usize = 64;
pub const DEFAULT_PARSE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DRAW_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn secs_or(&self, key: &str, default: Duration) -> Duration {
        match self.var(key).map(str::parse::<u64>) {
            Some(Ok(secs)) => Duration::from_secs(secs),
            Some(Err(err)) => {
                warn!(%err, key, "ignoring invalid duration override");
                default
            }
            None => default,
        }
    }

    /// Like `secs_or`, but `0` turns the deadline off.
    fn deadline_or(&self, key: &str, default: Duration) -> Option<Duration> {
        Some(self.secs_or(key, default)).filter(|limit| !limit.is_zero())
    }

    fn count_or(&self, key: &str, default: usize) -> usize {
        match self.var(key).map(str::parse::<usize>) {
            Some(Ok(value)) if value > 0 => value,
            Some(Ok(_)) => {
                warn!(key, "ignoring zero capacity override");
                default
            }
            Some(Err(err)) => {
                warn!(%err, key, "ignoring invalid count override");
                default
            }
            None => default,
        }
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// Settings for talking to the forge's web and API hosts.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Host that keymap URLs must name, compared case-insensitively.
    pub web_host: String,
    pub api_base: Url,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl ForgeConfig {
    #[must_use]
    pub fn new(web_host: &str, api_base: Url) -> Self {
        Self {
            web_host: web_host.to_ascii_lowercase(),
            api_base,
            token: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_SNAPSHOT_TTL,
            capacity: DEFAULT_SNAPSHOT_CAPACITY,
        }
    }
}

/// External programs the process-backed collaborators shell out to.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub west: String,
    pub python: String,
    pub rasterizer: String,
    /// Deadline for one keymap parser run; `None` waits forever.
    pub parse_timeout: Option<Duration>,
    /// Deadline for one renderer run.
    pub draw_timeout: Option<Duration>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            west: "west".to_string(),
            python: "python3".to_string(),
            rasterizer: "rsvg-convert".to_string(),
            parse_timeout: Some(DEFAULT_PARSE_TIMEOUT),
            draw_timeout: Some(DEFAULT_DRAW_TIMEOUT),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) forge: ForgeConfig,
    pub(crate) cache: CacheConfig,
    pub(crate) tools: ToolsConfig,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error if `KD_FORGE_API` is set but is not a valid URL.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> anyhow::Result<Self> {
        let api_base = match snapshot.var("KD_FORGE_API") {
            Some(raw) => {
                Url::parse(raw).with_context(|| format!("KD_FORGE_API is not a valid URL: {raw}"))?
            }
            None => Url::parse(DEFAULT_API_BASE)?,
        };
        let token = snapshot
            .var("KD_GITHUB_TOKEN")
            .or_else(|| snapshot.var("GITHUB_TOKEN"))
            .map(ToOwned::to_owned);
        let defaults = ToolsConfig::default();
        Ok(Self {
            forge: ForgeConfig {
                web_host: snapshot
                    .var("KD_FORGE_HOST")
                    .unwrap_or(DEFAULT_WEB_HOST)
                    .to_ascii_lowercase(),
                api_base,
                token,
                timeout: snapshot.secs_or("KD_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT),
            },
            cache: CacheConfig {
                ttl: snapshot.secs_or("KD_SNAPSHOT_TTL_SECS", DEFAULT_SNAPSHOT_TTL),
                capacity: snapshot.count_or("KD_SNAPSHOT_CAPACITY", DEFAULT_SNAPSHOT_CAPACITY),
            },
            tools: ToolsConfig {
                west: snapshot.var("KD_WEST").map_or(defaults.west, ToOwned::to_owned),
                python: snapshot
                    .var("KD_PYTHON")
                    .map_or(defaults.python, ToOwned::to_owned),
                rasterizer: snapshot
                    .var("KD_RSVG_CONVERT")
                    .map_or(defaults.rasterizer, ToOwned::to_owned),
                parse_timeout: snapshot.deadline_or("KD_PARSE_TIMEOUT_SECS", DEFAULT_PARSE_TIMEOUT),
                draw_timeout: snapshot.deadline_or("KD_DRAW_TIMEOUT_SECS", DEFAULT_DRAW_TIMEOUT),
            },
        })
    }

    #[must_use]
    pub fn forge(&self) -> &ForgeConfig {
        &self.forge
    }

    #[must_use]
    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    #[must_use]
    pub fn tools(&self) -> &ToolsConfig {
        &self.tools
    }
}
