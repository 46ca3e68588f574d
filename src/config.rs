use std::fmt;

use crate::error::{R2rError, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:7272";
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerMode {
    #[default]
    Stdio,
    Http,
    Both,
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub mode: ServerMode,
    pub http_addr: Option<String>,
    pub http_port: Option<u16>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!(
            "{}:{}",
            self.http_addr.as_deref().unwrap_or(DEFAULT_HTTP_ADDR),
            self.http_port.unwrap_or(DEFAULT_HTTP_PORT)
        )
    }
}

/// 用户名/密码对。两者都存在时才启用认证模式。
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct R2rConfig {
    pub base_url: String,
    pub credentials: Option<Credentials>,
}

impl Default for R2rConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub r2r: R2rConfig,
    pub server: ServerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = var("R2R_BASE_URL")
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        // any non-empty value counts, whitespace included
        let secret = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let credentials = match (secret("R2R_USERNAME"), secret("R2R_PASSWORD")) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };

        let mode = match var("R2R_MCP_MODE").map(|m| m.to_ascii_lowercase()) {
            None => ServerMode::Stdio,
            Some(m) => match m.as_str() {
                "stdio" => ServerMode::Stdio,
                "http" => ServerMode::Http,
                "both" => ServerMode::Both,
                other => {
                    return Err(R2rError::ConfigError(format!(
                        "unknown R2R_MCP_MODE: {other}"
                    )))
                }
            },
        };

        let http_port = var("R2R_MCP_HTTP_PORT")
            .map(|p| {
                p.parse::<u16>().map_err(|e| {
                    R2rError::ConfigError(format!("invalid R2R_MCP_HTTP_PORT {p}: {e}"))
                })
            })
            .transpose()?;

        Ok(Self {
            r2r: R2rConfig {
                base_url,
                credentials,
            },
            server: ServerConfig {
                mode,
                http_addr: var("R2R_MCP_HTTP_ADDR"),
                http_port,
            },
        })
    }
}
