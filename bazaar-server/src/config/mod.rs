//! Configuration module for bazaar-server.
//!
//! Handles loading configuration from the TOML file, CLI arguments and
//! environment variables, and converts it into the core's runtime types.

pub mod file;

use crate::config::file::{AuditSinkKind, FileConfig, RateLimitPolicyConfig};
use bazaar_core::config::{
    CoreConfig, JobsConfig, ListingConfig, OutboxConfig, PayoutConfig, RateLimitConfig,
    RateLimitPolicy,
};
use bazaar_core::rate_limit::OperationType;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Listener and process settings that are not hot-reloadable.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen: SocketAddr,
    pub hub_capacity: usize,
    pub max_db_connections: u32,
    pub audit_sink: AuditSinkKind,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: Url,
    pub api_key: Option<String>,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerSettings,
    pub gateway: GatewaySettings,
    pub core: CoreConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read, override, validate and convert the configuration file.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        build_loaded_config(file_config)
    }

    /// Reload the configuration (used during SIGHUP).
    ///
    /// Only the rate-limit policies are applied to the running process;
    /// everything else takes effect on restart.
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    validate(&file_config)?;

    let rate_limits = match file_config.rate_limits {
        Some(policies) => convert_rate_limits(policies),
        None => RateLimitConfig::default(),
    };
    let gateway_timeout = Duration::from_secs(file_config.gateway.timeout_secs);

    let core = CoreConfig {
        outbox: OutboxConfig {
            poll_interval: Duration::from_secs(file_config.outbox.poll_interval_secs),
            batch_size: file_config.outbox.batch_size,
            claim_lease: Duration::from_secs(file_config.outbox.claim_lease_secs),
            max_attempts: file_config.outbox.max_attempts,
        },
        payouts: PayoutConfig {
            gateway_timeout,
            reconciliation_grace: Duration::from_secs(file_config.payouts.reconciliation_grace_secs),
            abandon_after: Duration::from_secs(file_config.payouts.abandon_after_hours * 60 * 60),
            reconciliation_batch: file_config.payouts.reconciliation_batch,
        },
        listings: ListingConfig {
            active_days: file_config.listings.active_days,
            batch_size: file_config.listings.batch_size,
        },
        jobs: JobsConfig {
            expiry_reminder: Duration::from_secs(file_config.jobs.expiry_reminder_secs),
            payout_reconciliation: Duration::from_secs(file_config.jobs.payout_reconciliation_secs),
            outbox_replay: Duration::from_secs(file_config.jobs.outbox_replay_secs),
            rate_limit_reset: Duration::from_secs(file_config.jobs.rate_limit_reset_secs),
        },
        rate_limits,
    };

    Ok(LoadedConfig {
        server: ServerSettings {
            listen: file_config.server.listen,
            hub_capacity: file_config.server.hub_capacity,
            max_db_connections: file_config.server.max_db_connections,
            audit_sink: file_config.server.audit_sink,
        },
        gateway: GatewaySettings {
            base_url: file_config.gateway.base_url,
            api_key: file_config.gateway.api_key,
        },
        core,
    })
}

/// Ten years.
const MAX_ACTIVE_DAYS: u32 = 3650;

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let positive = [
        ("gateway.timeout_secs", config.gateway.timeout_secs),
        ("outbox.poll_interval_secs", config.outbox.poll_interval_secs),
        ("outbox.claim_lease_secs", config.outbox.claim_lease_secs),
        ("jobs.expiry_reminder_secs", config.jobs.expiry_reminder_secs),
        ("jobs.payout_reconciliation_secs", config.jobs.payout_reconciliation_secs),
        ("jobs.outbox_replay_secs", config.jobs.outbox_replay_secs),
        ("jobs.rate_limit_reset_secs", config.jobs.rate_limit_reset_secs),
        ("server.hub_capacity", config.server.hub_capacity as u64),
        ("outbox.batch_size", config.outbox.batch_size as u64),
        ("listings.active_days", u64::from(config.listings.active_days)),
    ];
    if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
        return Err(ConfigError::ValidationError(format!("{name} must be positive")));
    }
    if config.listings.active_days > MAX_ACTIVE_DAYS {
        return Err(ConfigError::ValidationError(format!(
            "listings.active_days may not exceed {MAX_ACTIVE_DAYS}"
        )));
    }
    if config.outbox.max_attempts < 1 {
        return Err(ConfigError::ValidationError(
            "outbox.max_attempts must be at least 1".to_string(),
        ));
    }
    if config.listings.batch_size < 1 || config.payouts.reconciliation_batch < 1 {
        return Err(ConfigError::ValidationError(
            "batch sizes must be at least 1".to_string(),
        ));
    }

    for (op, policy) in config.rate_limits.iter().flatten() {
        if policy.max == 0 {
            return Err(ConfigError::ValidationError(format!(
                "rate limit for {op} must allow at least one call"
            )));
        }
        if !policy.daily && policy.window_secs.is_none_or(|w| w == 0) {
            return Err(ConfigError::ValidationError(format!(
                "rate limit for {op} needs a positive window_secs or daily = true"
            )));
        }
    }
    Ok(())
}

fn convert_rate_limits(policies: HashMap<OperationType, RateLimitPolicyConfig>) -> RateLimitConfig {
    let policies = policies
        .into_iter()
        .map(|(op, p)| {
            let policy = if p.daily {
                RateLimitPolicy::per_day(p.max)
            } else {
                RateLimitPolicy::per_window(p.max, Duration::from_secs(p.window_secs.unwrap_or(60)))
            };
            (op, policy)
        })
        .collect();
    RateLimitConfig { policies }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<LoadedConfig, ConfigError> {
        build_loaded_config(toml::from_str(toml_str)?)
    }

    #[test]
    fn test_defaults_fill_the_core_config() {
        let loaded = parse(
            r#"
[gateway]
base_url = "https://payouts.example.com"
timeout_secs = 4
"#,
        )
        .unwrap();

        assert_eq!(loaded.core.payouts.gateway_timeout, Duration::from_secs(4));
        assert_eq!(
            loaded.core.payouts.abandon_after,
            Duration::from_secs(72 * 60 * 60)
        );
        assert_eq!(loaded.core.listings.active_days, 30);
        assert_eq!(loaded.core.rate_limits, RateLimitConfig::default());
        assert_eq!(loaded.server.listen.port(), 8080);
    }

    #[test]
    fn test_rate_limit_table_replaces_defaults() {
        let loaded = parse(
            r#"
[gateway]
base_url = "https://payouts.example.com"

[rate_limits.payout_request]
max = 2
daily = true

[rate_limits.listing_mutation]
max = 5
window_secs = 10
"#,
        )
        .unwrap();

        let limits = &loaded.core.rate_limits;
        assert_eq!(limits.policies.len(), 2);
        assert_eq!(
            limits.policy(OperationType::PayoutRequest),
            Some(RateLimitPolicy::per_day(2))
        );
        assert_eq!(
            limits.policy(OperationType::ListingMutation),
            Some(RateLimitPolicy::per_window(5, Duration::from_secs(10)))
        );
        assert!(limits.policy(OperationType::Refund).is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let zero_attempts = parse(
            r#"
[gateway]
base_url = "https://payouts.example.com"

[outbox]
max_attempts = 0
"#,
        );
        assert!(matches!(zero_attempts, Err(ConfigError::ValidationError(_))));

        let no_window = parse(
            r#"
[gateway]
base_url = "https://payouts.example.com"

[rate_limits.refund]
max = 3
"#,
        );
        assert!(matches!(no_window, Err(ConfigError::ValidationError(_))));

        let endless_listings = parse(
            r#"
[gateway]
base_url = "https://payouts.example.com"

[listings]
active_days = 4000000000
"#,
        );
        assert!(matches!(endless_listings, Err(ConfigError::ValidationError(_))));
    }
}
