//! Configuration management for the gateway core
//!
//! A single serde-typed document covering every component's knobs, loadable
//! from JSON or YAML with environment overrides layered on top. Credentials
//! never live here; they come from per-provider environment variables at
//! dispatch time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::budget::BudgetConfig;
use crate::cache::CacheConfig;
use crate::error::{GatewayError, Result};
use crate::retry::RetryConfig;
use crate::router::RouterConfig;
use crate::types::ProviderId;

/// Per-provider transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// HTTP request timeout in seconds, shared by every strategy
    pub timeout_secs: u64,
    /// Base-URL overrides (proxies, regional endpoints, test servers)
    pub base_urls: HashMap<ProviderId, String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            base_urls: HashMap::new(),
        }
    }
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_url_override(&self, provider: ProviderId) -> Option<String> {
        self.base_urls.get(&provider).cloned()
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// External catalog document; the built-in table is used when unset
    pub catalog_path: Option<PathBuf>,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub router: RouterConfig,
    pub budget: BudgetConfig,
    pub providers: ProviderSettings,
}

impl GatewayConfig {
    /// Load from a JSON or YAML file (by extension), then apply environment
    /// overrides and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let mut config: GatewayConfig = if is_yaml {
            serde_yaml::from_str(&raw)
                .map_err(|e| GatewayError::Config(format!("config YAML parse error: {e}")))?
        } else {
            serde_json::from_str(&raw)
                .map_err(|e| GatewayError::Config(format!("config JSON parse error: {e}")))?
        };

        config.apply_env();
        config.validate()?;
        info!(path = %path.display(), "gateway configuration loaded");
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        // A .env file is a convenience, not a requirement.
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("STRATUM_CATALOG_PATH") {
            if !path.trim().is_empty() {
                self.catalog_path = Some(PathBuf::from(path));
            }
        }
        if let Some(n) = env_parse::<usize>("STRATUM_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = n;
        }
        if let Some(n) = env_parse::<u64>("STRATUM_CACHE_TTL_SECS") {
            self.cache.ttl_secs = n;
        }
        if let Some(n) = env_parse::<u64>("STRATUM_REQUEST_TIMEOUT_SECS") {
            self.providers.timeout_secs = n;
        }
        if let Some(n) = env_parse::<f64>("STRATUM_SESSION_BUDGET_USD") {
            self.budget.default_budget_usd = Some(n);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(GatewayError::Config(
                "cache.max_entries must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(GatewayError::Config(
                "retry.max_attempts must be at least one".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(GatewayError::Config(
                "retry.jitter_ratio must lie in [0, 1]".to_string(),
            ));
        }
        if self.router.chain_length == 0 {
            return Err(GatewayError::Config(
                "router.chain_length must be at least one".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.budget.alert_threshold) {
            return Err(GatewayError::Config(
                "budget.alert_threshold must lie in [0, 1]".to_string(),
            ));
        }
        if let Some(limit) = self.budget.default_budget_usd {
            if limit < 0.0 {
                return Err(GatewayError::Config(
                    "budget.default_budget_usd must be non-negative".to_string(),
                ));
            }
        }
        if self.providers.timeout_secs == 0 {
            return Err(GatewayError::Config(
                "providers.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok()?.trim().parse().ok()
}
