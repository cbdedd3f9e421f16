use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MESSAGES_PER_SECOND: u32 = 10;
pub const DEFAULT_MESSAGES_PER_MINUTE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub messages_per_second: u32,
    pub messages_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_second: DEFAULT_MESSAGES_PER_SECOND,
            messages_per_minute: DEFAULT_MESSAGES_PER_MINUTE,
        }
    }
}

impl RateLimitConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let parsed = toml::from_str::<RateLimitConfig>(&raw).context("parse config")?;
        Ok(parsed)
    }

    /// Explicit values (flags or environment) win over the file.
    pub fn with_overrides(mut self, per_second: Option<u32>, per_minute: Option<u32>) -> Self {
        if let Some(value) = per_second {
            self.messages_per_second = value;
        }
        if let Some(value) = per_minute {
            self.messages_per_minute = value;
        }
        self
    }
}
