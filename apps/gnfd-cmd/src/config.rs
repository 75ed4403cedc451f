//! CLI configuration.
//!
//! Stored as TOML at `~/.config/gnfd-cmd/config.toml`. A missing file means
//! defaults; every field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gnfd_protocol::constants::{DEFAULT_EC_SHARDS, DEFAULT_SEGMENT_SIZE};
use gnfd_sp_client::{ClientConfig, RetryOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SP endpoint, `host[:port]` or a full URL.
    pub endpoint: String,
    /// Use https for endpoints given without a scheme.
    pub secure: bool,
    /// Hex-encoded private key file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    pub segment_size: usize,
    pub ec_shards: usize,
    pub timeout_secs: u64,
    pub retry_count: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            secure: true,
            key_file: None,
            segment_size: DEFAULT_SEGMENT_SIZE,
            ec_shards: DEFAULT_EC_SHARDS,
            timeout_secs: 60,
            retry_count: 3,
        }
    }
}

impl Config {
    /// Loads `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;

        // Restrict permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            secure: self.secure,
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: None,
            retry: RetryOptions {
                count: self.retry_count,
                ..RetryOptions::default()
            },
        }
    }
}

/// `~/.config/gnfd-cmd/config.toml`.
pub fn default_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("gnfd-cmd")
        .join("config.toml")
}
