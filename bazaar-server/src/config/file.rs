//! TOML file configuration structures.
//!
//! These structs directly map to the `bazaar.toml` file format. Durations are
//! written as whole seconds.

use bazaar_core::rate_limit::OperationType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub payouts: PayoutConfig,
    #[serde(default)]
    pub listings: ListingConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    /// Per-operation policies. When the table is absent the built-in
    /// defaults apply; when present it replaces them entirely.
    #[serde(default)]
    pub rate_limits: Option<HashMap<OperationType, RateLimitPolicyConfig>>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
    /// Buffered events per live channel before slow subscribers lag.
    #[serde(default = "default_hub_capacity")]
    pub hub_capacity: usize,
    #[serde(default = "default_max_connections")]
    pub max_db_connections: u32,
    /// Where audit records go.
    #[serde(default)]
    pub audit_sink: AuditSinkKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    /// The `audit_log` table.
    #[default]
    Database,
    /// Structured log lines under the `audit` target.
    Log,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            hub_capacity: default_hub_capacity(),
            max_db_connections: default_max_connections(),
            audit_sink: AuditSinkKind::default(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_hub_capacity() -> usize {
    bazaar_core::transport::DEFAULT_HUB_CAPACITY
}

fn default_max_connections() -> u32 {
    10
}

/// Payment gateway used for payouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: Url,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

fn default_gateway_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    pub poll_interval_secs: u64,
    pub batch_size: usize,
    pub claim_lease_secs: u64,
    pub max_attempts: i32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            batch_size: 100,
            claim_lease_secs: 30,
            max_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutConfig {
    pub reconciliation_grace_secs: u64,
    pub abandon_after_hours: u64,
    pub reconciliation_batch: i64,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            reconciliation_grace_secs: 15 * 60,
            abandon_after_hours: 72,
            reconciliation_batch: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub active_days: u32,
    pub batch_size: i64,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            active_days: 30,
            batch_size: 500,
        }
    }
}

/// Periods of the scheduled jobs, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub expiry_reminder_secs: u64,
    pub payout_reconciliation_secs: u64,
    pub outbox_replay_secs: u64,
    pub rate_limit_reset_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            expiry_reminder_secs: 60 * 60,
            payout_reconciliation_secs: 24 * 60 * 60,
            outbox_replay_secs: 5 * 60,
            rate_limit_reset_secs: 24 * 60 * 60,
        }
    }
}

/// One operation's policy. `daily = true` ignores `window_secs` and uses a
/// day-long window that the reset job also clears.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitPolicyConfig {
    pub max: u32,
    #[serde(default)]
    pub window_secs: Option<u64>,
    #[serde(default)]
    pub daily: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"
audit_sink = "log"

[gateway]
base_url = "https://payouts.example.com/v1"
api_key = "gw-secret"

[rate_limits.payout_request]
max = 3
daily = true

[rate_limits.refund]
max = 10
window_secs = 60
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.server.hub_capacity, 1024);
        assert_eq!(config.server.audit_sink, AuditSinkKind::Log);
        assert_eq!(config.gateway.timeout_secs, 10);
        assert_eq!(config.outbox.max_attempts, 10);
        assert_eq!(config.jobs.outbox_replay_secs, 300);

        let policies = config.rate_limits.unwrap();
        assert_eq!(policies.len(), 2);
        assert!(policies[&OperationType::PayoutRequest].daily);
        assert_eq!(policies[&OperationType::Refund].window_secs, Some(60));
    }

    #[test]
    fn test_gateway_section_is_required() {
        let err = toml::from_str::<FileConfig>("[server]\nlisten = \"127.0.0.1:3000\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_unknown_operation_is_rejected() {
        let toml_str = r#"
[gateway]
base_url = "https://payouts.example.com"

[rate_limits.withdraw_everything]
max = 1
daily = true
"#;
        assert!(toml::from_str::<FileConfig>(toml_str).is_err());
    }
}
