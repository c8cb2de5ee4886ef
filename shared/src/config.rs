//! Engine configuration loaded from environment variables
//!
//! Every setting has a default so the engine can start with nothing but the two
//! API keys exported. `from_env` reads the process environment; `from_lookup`
//! takes any key lookup so parsing can be exercised without touching it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{SharedError, SharedResult};
use crate::types::ServiceKind;

/// Credentials, endpoints and model parameters for the two remote services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub image_api_key: String,
    pub image_api_base_url: String,
    pub image_model: String,
    pub image_output_dir: PathBuf,
    pub http_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            openrouter_api_key: String::new(),
            openrouter_base_url: "https://openrouter.ai/api/v1".to_string(),
            default_model: "anthropic/claude-3.7-sonnet".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
            image_api_key: String::new(),
            image_api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            image_model: "gemini-2.0-flash-exp-image-generation".to_string(),
            image_output_dir: PathBuf::from("output/images"),
            http_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-service ceilings over a sliding window. A ceiling of 0 disables limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub tokens_per_window: u64,
    pub images_per_window: u64,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn ceiling_for(&self, service: ServiceKind) -> u64 {
        match service {
            ServiceKind::Content => self.tokens_per_window,
            ServiceKind::Image => self.images_per_window,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tokens_per_window: 90_000,
            images_per_window: 50,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub expiry: Duration,
    /// Optional snapshot file for reuse across runs
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiry: Duration::from_secs(86_400),
            path: None,
        }
    }
}

/// Spend ceilings for one batch run. `None` means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub max_tokens: Option<u64>,
    pub max_images: Option<u64>,
    pub max_cost_usd: Option<f64>,
    pub usd_per_1k_tokens: f64,
    pub usd_per_image: f64,
}

impl BudgetConfig {
    pub fn unlimited() -> Self {
        Self {
            max_tokens: None,
            max_images: None,
            max_cost_usd: None,
            ..Self::default()
        }
    }

    /// Monetary estimate for `units` of `service`
    pub fn cost_of(&self, service: ServiceKind, units: u64) -> f64 {
        match service {
            ServiceKind::Content => units as f64 / 1000.0 * self.usd_per_1k_tokens,
            ServiceKind::Image => units as f64 * self.usd_per_image,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: None,
            max_images: None,
            max_cost_usd: None,
            usd_per_1k_tokens: 0.015,
            usd_per_image: 0.04,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per external call, including the first
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryConfig {
    /// Delay before attempt `attempt + 1`, where `attempt` counts from 1
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.backoff_base.saturating_mul(1u32 << exponent);
        delay.min(self.backoff_max)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(2000),
            backoff_max: Duration::from_millis(10_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub max_concurrent: usize,
    pub image_concurrency: usize,
    /// Upper bound on a rate-limit wait or a single external call
    pub call_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            image_concurrency: 3,
            call_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" | "compact" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Complete configuration consumed by the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub api: ApiConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub budget: BudgetConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> SharedResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> SharedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let defaults = EngineConfig::default();

        let api = ApiConfig {
            openrouter_api_key: env.string("OPENROUTER_API_KEY").unwrap_or_default(),
            openrouter_base_url: env
                .string("OPENROUTER_BASE_URL")
                .unwrap_or(defaults.api.openrouter_base_url),
            default_model: env.string("DEFAULT_MODEL").unwrap_or(defaults.api.default_model),
            temperature: env.parse("MODEL_TEMPERATURE")?.unwrap_or(defaults.api.temperature),
            max_tokens: env.parse("MODEL_MAX_TOKENS")?.unwrap_or(defaults.api.max_tokens),
            image_api_key: env
                .string("IMAGE_API_KEY")
                .or_else(|| env.string("GEMINI_API_KEY"))
                .unwrap_or_default(),
            image_api_base_url: env
                .string("IMAGE_API_BASE_URL")
                .unwrap_or(defaults.api.image_api_base_url),
            image_model: env.string("IMAGE_MODEL").unwrap_or(defaults.api.image_model),
            image_output_dir: env
                .string("IMAGE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.api.image_output_dir),
            http_timeout: env.seconds("HTTP_TIMEOUT")?.unwrap_or(defaults.api.http_timeout),
        };

        let rate_limit = RateLimitConfig {
            tokens_per_window: env
                .parse("RATE_LIMIT_TOKENS_PER_MINUTE")?
                .unwrap_or(defaults.rate_limit.tokens_per_window),
            images_per_window: env
                .parse("RATE_LIMIT_IMAGES_PER_MINUTE")?
                .unwrap_or(defaults.rate_limit.images_per_window),
            window: env
                .seconds("RATE_LIMIT_WINDOW_SECONDS")?
                .unwrap_or(defaults.rate_limit.window),
        };

        let cache = CacheConfig {
            enabled: env.flag("ENABLE_CACHE")?.unwrap_or(defaults.cache.enabled),
            expiry: env
                .seconds("CACHE_EXPIRY_SECONDS")?
                .unwrap_or(defaults.cache.expiry),
            path: env.string("CACHE_PATH").map(PathBuf::from),
        };

        let budget = BudgetConfig {
            max_tokens: env.parse("BUDGET_MAX_TOKENS")?,
            max_images: env.parse("BUDGET_MAX_IMAGES")?,
            max_cost_usd: env.parse("BUDGET_MAX_COST_USD")?,
            usd_per_1k_tokens: env
                .parse("PRICE_PER_1K_TOKENS_USD")?
                .unwrap_or(defaults.budget.usd_per_1k_tokens),
            usd_per_image: env
                .parse("PRICE_PER_IMAGE_USD")?
                .unwrap_or(defaults.budget.usd_per_image),
        };

        let retry = RetryConfig {
            max_attempts: env
                .parse("RETRY_MAX_ATTEMPTS")?
                .unwrap_or(defaults.retry.max_attempts),
            backoff_base: env
                .millis("RETRY_BACKOFF_BASE_MS")?
                .unwrap_or(defaults.retry.backoff_base),
            backoff_max: env
                .millis("RETRY_BACKOFF_MAX_MS")?
                .unwrap_or(defaults.retry.backoff_max),
        };

        let batch = BatchConfig {
            max_concurrent: env
                .parse("MAX_CONCURRENT")?
                .unwrap_or(defaults.batch.max_concurrent),
            image_concurrency: env
                .parse("IMAGES_PER_ARTICLE_CONCURRENCY")?
                .unwrap_or(defaults.batch.image_concurrency),
            call_timeout: env
                .seconds("CALL_TIMEOUT_SECONDS")?
                .unwrap_or(defaults.batch.call_timeout),
        };

        let logging = LoggingConfig {
            level: env.string("LOG_LEVEL").unwrap_or(defaults.logging.level).to_lowercase(),
            format: env.parse("LOG_FORMAT")?.unwrap_or(defaults.logging.format),
        };

        let config = EngineConfig {
            api,
            rate_limit,
            cache,
            budget,
            retry,
            batch,
            logging,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> SharedResult<()> {
        if self.batch.max_concurrent == 0 {
            return Err(SharedError::invalid("MAX_CONCURRENT", "0"));
        }
        if self.batch.image_concurrency == 0 {
            return Err(SharedError::invalid("IMAGES_PER_ARTICLE_CONCURRENCY", "0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(SharedError::invalid("RETRY_MAX_ATTEMPTS", "0"));
        }
        if self.rate_limit.window.is_zero() {
            return Err(SharedError::invalid("RATE_LIMIT_WINDOW_SECONDS", "0"));
        }
        if self.batch.call_timeout.is_zero() {
            return Err(SharedError::invalid("CALL_TIMEOUT_SECONDS", "0"));
        }
        Ok(())
    }

    /// Both remote services need a key before real backends can be built
    pub fn require_credentials(&self) -> SharedResult<()> {
        if self.api.openrouter_api_key.is_empty() {
            return Err(SharedError::MissingConfig {
                field: "OPENROUTER_API_KEY".to_string(),
            });
        }
        if self.api.image_api_key.is_empty() {
            return Err(SharedError::MissingConfig {
                field: "IMAGE_API_KEY".to_string(),
            });
        }
        Ok(())
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> SharedResult<Option<T>> {
        match self.string(key) {
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|_| SharedError::invalid(key, raw)),
            None => Ok(None),
        }
    }

    fn flag(&self, key: &str) -> SharedResult<Option<bool>> {
        match self.string(key) {
            Some(raw) => match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Some(true)),
                "false" | "0" | "no" | "off" => Ok(Some(false)),
                _ => Err(SharedError::invalid(key, raw)),
            },
            None => Ok(None),
        }
    }

    fn seconds(&self, key: &str) -> SharedResult<Option<Duration>> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_secs))
    }

    fn millis(&self, key: &str) -> SharedResult<Option<Duration>> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> SharedResult<EngineConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.rate_limit.tokens_per_window, 90_000);
        assert_eq!(config.rate_limit.images_per_window, 50);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.expiry, Duration::from_secs(86_400));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.batch.max_concurrent, 3);
        assert!(config.budget.max_tokens.is_none());
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("OPENROUTER_API_KEY", "or-key"),
            ("GEMINI_API_KEY", "gem-key"),
            ("ENABLE_CACHE", "no"),
            ("CACHE_EXPIRY_SECONDS", "60"),
            ("BUDGET_MAX_TOKENS", "5000"),
            ("BUDGET_MAX_COST_USD", "1.5"),
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("RETRY_BACKOFF_BASE_MS", "10"),
            ("MAX_CONCURRENT", "8"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(config.api.image_api_key, "gem-key");
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.expiry, Duration::from_secs(60));
        assert_eq!(config.budget.max_tokens, Some(5000));
        assert_eq!(config.budget.max_cost_usd, Some(1.5));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_base, Duration::from_millis(10));
        assert_eq!(config.batch.max_concurrent, 8);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.require_credentials().is_ok());
    }

    #[test]
    fn test_malformed_value_names_the_field() {
        let err = config_from(&[("RATE_LIMIT_TOKENS_PER_MINUTE", "lots")]).unwrap_err();
        assert_eq!(err, SharedError::invalid("RATE_LIMIT_TOKENS_PER_MINUTE", "lots"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(config_from(&[("MAX_CONCURRENT", "0")]).is_err());
        assert!(config_from(&[("RETRY_MAX_ATTEMPTS", "0")]).is_err());
    }

    #[test]
    fn test_missing_credentials_reported() {
        let config = config_from(&[("OPENROUTER_API_KEY", "key")]).unwrap();
        assert_eq!(
            config.require_credentials().unwrap_err(),
            SharedError::MissingConfig { field: "IMAGE_API_KEY".to_string() }
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 5,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_millis(350),
        };
        assert_eq!(retry.backoff_for(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_for(3), Duration::from_millis(350));
    }

    #[test]
    fn test_cost_estimates() {
        let budget = BudgetConfig::default();
        assert!((budget.cost_of(ServiceKind::Content, 2000) - 0.03).abs() < 1e-9);
        assert!((budget.cost_of(ServiceKind::Image, 3) - 0.12).abs() < 1e-9);
    }
}
