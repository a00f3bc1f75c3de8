use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::util::is_local_endpoint_url;

const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const MIN_TIMEOUT_SECS: u64 = 5;
const MAX_TIMEOUT_SECS: u64 = 900;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Replaces every phase's default timeout when set.
    pub timeout_override: Option<Duration>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let base_url = std::env::var("CHATFENCE_BASE_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var("CHATFENCE_API_KEY").ok().and_then(|v| {
            if v.trim().is_empty() {
                None
            } else {
                Some(v)
            }
        });
        let timeout_override = match std::env::var("CHATFENCE_TIMEOUT_SECS") {
            Ok(value) if !value.trim().is_empty() => {
                let Ok(secs) = value.trim().parse::<u64>() else {
                    bail!("Invalid CHATFENCE_TIMEOUT_SECS '{value}': expected whole seconds");
                };
                Some(Duration::from_secs(
                    secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS),
                ))
            }
            _ => None,
        };

        Ok(Self {
            base_url,
            api_key,
            timeout_override,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            bail!(
                "Invalid CHATFENCE_BASE_URL '{}': expected http:// or https:// URL",
                self.base_url
            );
        }

        if !self.is_local_endpoint() && self.api_key.is_none() {
            bail!(
                "CHATFENCE_API_KEY must be set for non-local endpoints (url: '{}')",
                self.base_url
            );
        }

        Ok(())
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.base_url)
    }
}
