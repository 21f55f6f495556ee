//! Queue configuration, loaded from the environment the way
//! `hook-worker::config::Config` does: one `envconfig`-derived struct,
//! `FromStr` newtypes for anything with a non-trivial grammar, parsed once
//! at startup with config errors treated as fatal.

use envconfig::Envconfig;

use crate::duration::{BackoffSpec, ParsedDuration, RateSpec};
use crate::error::ConfigError;

#[derive(Envconfig, Debug, Clone)]
pub struct Config {
    #[envconfig(from = "QUEUE_NAME")]
    pub queue_name: String,

    #[envconfig(from = "QUEUE_DESCRIPTION")]
    pub description: Option<String>,

    #[envconfig(from = "QUEUE_DATABASE_URL", default = "sqlite://queue.db")]
    pub database_url: String,

    #[envconfig(from = "QUEUE_POLL_INTERVAL", default = "1s")]
    pub poll_interval: String,

    #[envconfig(from = "QUEUE_RATE_LIMIT", default = "100/s")]
    pub rate_limit: String,

    #[envconfig(from = "QUEUE_BACKOFF", default = "exp 1s")]
    pub backoff: String,

    #[envconfig(from = "QUEUE_MAX_RETRIES", default = "0")]
    pub max_retries: u32,

    #[envconfig(from = "QUEUE_MAX_CONCURRENT_DISPATCHES", default = "10")]
    pub max_concurrent_dispatches: usize,

    #[envconfig(from = "QUEUE_MAX_PROCESSING_TIME", default = "5m")]
    pub max_processing_time: String,

    #[envconfig(from = "QUEUE_PRUNE_AFTER", default = "7d")]
    pub prune_after: String,

    #[envconfig(from = "QUEUE_PROCESSING_STARTUP_DELAY", default = "0s")]
    pub processing_startup_delay: String,

    #[envconfig(from = "QUEUE_ADMIN_BIND_ADDR", default = "0.0.0.0:8080")]
    pub admin_bind_addr: String,

    #[envconfig(from = "QUEUE_SELF_URL")]
    pub self_url: Option<String>,

    #[envconfig(from = "CEEN_SELF_HTTPS_URL")]
    pub ceen_self_https_url: Option<String>,

    #[envconfig(from = "CEEN_SELF_HTTP_URL")]
    pub ceen_self_http_url: Option<String>,

    #[envconfig(from = "QUEUE_SELF_CALLBACK_HEADER", default = "X-Queue-Self-Callback")]
    pub self_callback_header: String,

    #[envconfig(from = "QUEUE_SELF_CALLBACK_SECRET")]
    pub self_callback_secret: Option<String>,
}

/// The resolved, typed view of `Config`: everything parsed and validated
/// once so the rest of the crate never has to re-parse a duration string.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub queue_name: String,
    pub description: Option<String>,
    pub database_url: String,
    pub poll_interval: std::time::Duration,
    pub rate_limit: RateSpec,
    pub backoff: BackoffSpec,
    pub max_retries: u32,
    pub max_concurrent_dispatches: usize,
    pub max_processing_time: std::time::Duration,
    pub prune_after: std::time::Duration,
    pub processing_startup_delay: std::time::Duration,
    pub admin_bind_addr: String,
    pub self_url: String,
    pub self_callback_header: String,
    pub self_callback_secret: String,
}

impl Config {
    /// Resolve `Self{Https,Http}Url`: an explicit `QUEUE_SELF_URL` wins,
    /// otherwise fall back to `CEEN_SELF_HTTPS_URL` then `CEEN_SELF_HTTP_URL`
    /// per spec.md §6, and error if none are set since the self-callback
    /// convention requires an absolute base to resolve relative URLs against.
    pub fn resolve(self) -> Result<ResolvedConfig, ConfigError> {
        if self.queue_name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        let self_url = self
            .self_url
            .or(self.ceen_self_https_url)
            .or(self.ceen_self_http_url)
            .ok_or(ConfigError::MissingSelfUrl)?;

        let poll_interval = self
            .poll_interval
            .parse::<ParsedDuration>()
            .map_err(|e| ConfigError::InvalidDuration(self.poll_interval.clone(), e.to_string()))?
            .0;

        let rate_limit = self
            .rate_limit
            .parse::<RateSpec>()
            .map_err(|e| ConfigError::InvalidRateLimit(self.rate_limit.clone(), e.to_string()))?;

        let backoff = BackoffSpec::parse(&self.backoff, self.max_retries)
            .map_err(|e| ConfigError::InvalidBackoff(self.backoff.clone(), e.to_string()))?;

        let max_processing_time = self
            .max_processing_time
            .parse::<ParsedDuration>()
            .map_err(|e| {
                ConfigError::InvalidDuration(self.max_processing_time.clone(), e.to_string())
            })?
            .0;

        let prune_after = self
            .prune_after
            .parse::<ParsedDuration>()
            .map_err(|e| ConfigError::InvalidDuration(self.prune_after.clone(), e.to_string()))?
            .0;

        let processing_startup_delay = self
            .processing_startup_delay
            .parse::<ParsedDuration>()
            .map_err(|e| {
                ConfigError::InvalidDuration(self.processing_startup_delay.clone(), e.to_string())
            })?
            .0;

        // Unset means "generate one at startup" rather than "no secret": a
        // self-callback with no secret at all can't be told apart from an
        // arbitrary caller. Never logged.
        let self_callback_secret = self.self_callback_secret.unwrap_or_else(random_secret);

        Ok(ResolvedConfig {
            queue_name: self.queue_name,
            description: self.description,
            database_url: self.database_url,
            poll_interval,
            rate_limit,
            backoff,
            max_retries: self.max_retries,
            max_concurrent_dispatches: self.max_concurrent_dispatches,
            max_processing_time,
            prune_after,
            processing_startup_delay,
            admin_bind_addr: self.admin_bind_addr,
            self_url,
            self_callback_header: self.self_callback_header,
            self_callback_secret,
        })
    }
}

fn random_secret() -> String {
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            queue_name: "webhooks".into(),
            description: None,
            database_url: "sqlite::memory:".into(),
            poll_interval: "1s".into(),
            rate_limit: "100/s".into(),
            backoff: "exp 1s".into(),
            max_retries: 5,
            max_concurrent_dispatches: 10,
            max_processing_time: "5m".into(),
            prune_after: "7d".into(),
            processing_startup_delay: "0s".into(),
            admin_bind_addr: "0.0.0.0:8080".into(),
            self_url: Some("https://example.test".into()),
            ceen_self_https_url: None,
            ceen_self_http_url: None,
            self_callback_header: "X-Queue-Self-Callback".into(),
            self_callback_secret: None,
        }
    }

    #[test]
    fn resolves_a_valid_config() {
        let resolved = base_config().resolve().unwrap();
        assert_eq!(resolved.queue_name, "webhooks");
        assert_eq!(resolved.max_retries, 5);
    }

    #[test]
    fn empty_queue_name_is_rejected() {
        let mut config = base_config();
        config.queue_name = "  ".into();
        assert!(matches!(config.resolve(), Err(ConfigError::EmptyName)));
    }

    #[test]
    fn missing_self_url_falls_back_to_ceen_vars() {
        let mut config = base_config();
        config.self_url = None;
        config.ceen_self_http_url = Some("http://localhost:9000".into());
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.self_url, "http://localhost:9000");
    }

    #[test]
    fn no_self_url_anywhere_is_an_error() {
        let mut config = base_config();
        config.self_url = None;
        assert!(matches!(config.resolve(), Err(ConfigError::MissingSelfUrl)));
    }

    #[test]
    fn unset_self_callback_secret_is_generated() {
        let resolved = base_config().resolve().unwrap();
        assert!(!resolved.self_callback_secret.is_empty());
    }

    #[test]
    fn explicit_self_callback_secret_is_kept() {
        let mut config = base_config();
        config.self_callback_secret = Some("configured-secret".into());
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.self_callback_secret, "configured-secret");
    }
}
