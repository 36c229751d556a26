use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::accounts::{Tier, TrialWindow, UpsertAccountRequest};
use crate::artifact::ArtifactConfig;
use crate::backend::{BackendsConfig, ScannerConfig, TimeoutTier};
use crate::engine::{LimitsConfig, WorkerConfig};
use crate::intake::IntakeConfig;
use crate::quota::QuotaConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Accounts created or updated at startup.
    #[serde(default)]
    pub accounts: Vec<AccountSeed>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// API key when presented, otherwise session or a minted anonymous key.
    Session,
    /// Every request must carry a valid API key.
    ApiKey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Session => "session",
            AuthMethod::ApiKey => "api_key",
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mdraft.db")
}

/// An account declared in the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountSeed {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub tier: Tier,
    /// Trial window; both ends must be set for a trial to start.
    #[serde(default)]
    pub trial_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trial_end: Option<DateTime<Utc>>,
}

impl AccountSeed {
    pub fn trial_window(&self) -> Option<TrialWindow> {
        match (self.trial_start, self.trial_end) {
            (Some(start), Some(end)) => Some(TrialWindow { start, end }),
            _ => None,
        }
    }

    pub fn to_request(&self) -> UpsertAccountRequest {
        let mut request = UpsertAccountRequest::new(&self.user_id, self.tier);
        if let Some(email) = &self.email {
            request = request.with_email(email);
        }
        if let Some(api_key) = &self.api_key {
            request = request.with_api_key(api_key);
        }
        if let Some(window) = self.trial_window() {
            request = request.with_trial(window);
        }
        request
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub quota: QuotaConfig,
    pub intake: IntakeConfig,
    pub backends: SanitizedBackendsConfig,
    pub workers: WorkerConfig,
    pub artifacts: ArtifactConfig,
    pub limits: LimitsConfig,
    pub scanner: ScannerConfig,
    pub accounts_configured: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedBackendsConfig {
    pub standard: SanitizedStandardConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pro: Option<SanitizedProConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStandardConfig {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub timeout: TimeoutTier,
}

/// Sanitized Pro backend config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProConfig {
    pub endpoint: String,
    pub api_key_configured: bool,
    pub timeout: TimeoutTier,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: config.auth.method.as_str().to_string(),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            quota: config.quota.clone(),
            intake: config.intake.clone(),
            backends: SanitizedBackendsConfig {
                standard: SanitizedStandardConfig {
                    command: config.backends.standard.command.clone(),
                    args: config.backends.standard.args.clone(),
                    timeout: config.backends.standard.timeout,
                },
                pro: config.backends.pro.as_ref().map(|p| SanitizedProConfig {
                    endpoint: p.endpoint.clone(),
                    api_key_configured: !p.api_key.is_empty(),
                    timeout: p.timeout,
                }),
            },
            workers: config.workers.clone(),
            artifacts: config.artifacts.clone(),
            limits: config.limits.clone(),
            scanner: config.scanner.clone(),
            accounts_configured: config.accounts.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
[auth]
method = "session"

[server]
host = "127.0.0.1"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::Session);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.quota.anonymous_daily_limit, 5);
        assert_eq!(config.workers.pool_size, 4);
        assert!(config.backends.pro.is_none());
        assert!(config.accounts.is_empty());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let toml = r#"
[auth]
method = "api_key"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::ApiKey);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "mdraft.db");
        assert_eq!(config.artifacts.ttl_secs, 3600);
        assert_eq!(config.limits.max_batch_files, 20);
        assert!(!config.scanner.enabled);
    }

    #[test]
    fn test_deserialize_missing_auth_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[auth]
method = "session"

[quota]
anonymous_daily_limit = 3
registered_daily_limit = 100

[backends.standard]
command = "/usr/local/bin/markitdown"

[backends.standard.timeout]
base_secs = 10
per_mib_secs = 5
max_secs = 60

[backends.pro]
endpoint = "https://documentai.example.com/v1/process"
api_key = "secret-key"

[workers]
pool_size = 2
inline_max_bytes = 1024

[[accounts]]
user_id = "alice"
api_key = "alice-key"
tier = "pro"

[[accounts]]
user_id = "bob"
tier = "trial"
trial_start = "2024-01-01T00:00:00Z"
trial_end = "2024-01-15T00:00:00Z"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.quota.anonymous_daily_limit, 3);
        assert_eq!(config.quota.registered_daily_limit, Some(100));
        assert_eq!(config.backends.standard.timeout.max_secs, 60);
        let pro = config.backends.pro.as_ref().unwrap();
        assert_eq!(pro.api_key, "secret-key");
        assert_eq!(pro.timeout, TimeoutTier::pro());
        assert_eq!(config.workers.pool_size, 2);

        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.accounts[0].tier, Tier::Pro);
        assert!(config.accounts[0].trial_window().is_none());
        let bob = config.accounts[1].to_request();
        assert!(bob.on_trial);
        assert!(bob.trial_window.is_some());
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let toml = r#"
[auth]
method = "session"

[backends.pro]
endpoint = "https://documentai.example.com/v1/process"
api_key = "secret-key"

[[accounts]]
user_id = "alice"
api_key = "alice-key"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);

        assert_eq!(sanitized.auth.method, "session");
        assert_eq!(sanitized.accounts_configured, 1);
        let pro = sanitized.backends.pro.as_ref().unwrap();
        assert!(pro.api_key_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-key"));
        assert!(!json.contains("alice-key"));
    }
}
