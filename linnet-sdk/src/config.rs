//! Session configuration and validation.

use std::path::PathBuf;

use rand::Rng;
use serde::Deserialize;

use crate::error::ConfigError;

/// Everything needed to bring one session up.
///
/// Deserializes straight from the bot's TOML config file; every field has
/// a default so partial files and CLI overrides compose cleanly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Desired nickname. Each `?` is replaced by one random digit at
    /// registration time.
    pub nickname: String,
    /// Fallback nickname tried first on a collision.
    pub alt_nick: Option<String>,
    /// Server hostname or IP.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Upgrade the transport to TLS before any protocol bytes.
    pub tls: bool,
    /// Optional client certificate: one PEM file holding cert and key.
    pub cert: Option<PathBuf>,
    /// Channel to join once registered.
    pub channel: Option<String>,
    /// Realname for the USER line; defaults to the nickname.
    pub realname: Option<String>,
    /// Root for per-plugin data directories.
    pub data_root: Option<PathBuf>,
}

impl SessionConfig {
    /// Check required attributes. Fatal before connect: a failing config
    /// never opens a transport.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nickname.is_empty() {
            return Err(ConfigError::MissingField("nickname"));
        }
        if self.host.is_empty() {
            return Err(ConfigError::MissingField("host"));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if let Some(cert) = &self.cert {
            if !cert.is_file() {
                return Err(ConfigError::CertNotFound(cert.clone()));
            }
            if !self.tls {
                tracing::warn!(cert = %cert.display(), "client certificate configured but tls is disabled");
            }
        }
        Ok(())
    }

    /// The nickname with every `?` placeholder replaced by a random digit.
    pub fn effective_nickname(&self) -> String {
        let mut rng = rand::thread_rng();
        self.nickname
            .chars()
            .map(|c| {
                if c == '?' {
                    char::from_digit(rng.gen_range(0..10), 10).unwrap_or('0')
                } else {
                    c
                }
            })
            .collect()
    }

    /// Root directory for per-plugin data, defaulting to the platform
    /// data dir.
    pub fn data_root(&self) -> PathBuf {
        self.data_root.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("linnet")
        })
    }
}
