use std::collections::HashSet;

use super::{types::Config, ConfigError};
use crate::backend::TimeoutTier;
use crate::intake::family_for_extension;

/// Validate configuration
/// Currently validates:
/// - Auth section exists (enforced by serde)
/// - Server port is not 0
/// - Worker pool, queue and sweep settings are non-zero
/// - Backend timeouts are consistent and the Pro endpoint is usable
/// - Every allowed extension has a known signature
/// - Seeded accounts are unique and their trial windows are well formed
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return invalid("server.port cannot be 0");
    }

    // Worker validation
    let workers = &config.workers;
    if workers.pool_size == 0 {
        return invalid("workers.pool_size must be at least 1");
    }
    if workers.max_queued == 0 {
        return invalid("workers.max_queued must be at least 1");
    }
    if workers.queue_timeout_secs == 0 {
        return invalid("workers.queue_timeout_secs cannot be 0");
    }
    if workers.sweep_interval_secs == 0 {
        return invalid("workers.sweep_interval_secs cannot be 0");
    }
    if config.limits.max_batch_files == 0 {
        return invalid("limits.max_batch_files must be at least 1");
    }
    if config.artifacts.ttl_secs == 0 {
        return invalid("artifacts.ttl_secs cannot be 0");
    }

    // Backend validation
    validate_timeout("backends.standard.timeout", &config.backends.standard.timeout)?;
    if config.backends.standard.command.as_os_str().is_empty() {
        return invalid("backends.standard.command cannot be empty");
    }
    if let Some(pro) = &config.backends.pro {
        if !(pro.endpoint.starts_with("http://") || pro.endpoint.starts_with("https://")) {
            return invalid("backends.pro.endpoint must be an http(s) URL");
        }
        if pro.api_key.is_empty() {
            return invalid("backends.pro.api_key cannot be empty");
        }
        validate_timeout("backends.pro.timeout", &pro.timeout)?;
    }

    // Intake validation
    for (field, extensions) in [
        ("intake.standard_extensions", &config.intake.standard_extensions),
        ("intake.pro_extensions", &config.intake.pro_extensions),
    ] {
        let known = |ext: &&String| {
            family_for_extension(&ext.trim_start_matches('.').to_ascii_lowercase()).is_some()
        };
        if let Some(unknown) = extensions.iter().find(|ext| !known(ext)) {
            return invalid(format!("{} contains unknown extension '{}'", field, unknown));
        }
    }
    if config.intake.standard_max_bytes == 0 || config.intake.pro_max_bytes == 0 {
        return invalid("intake size limits cannot be 0");
    }

    // Account validation
    let mut user_ids = HashSet::new();
    let mut api_keys = HashSet::new();
    for account in &config.accounts {
        if account.user_id.trim().is_empty() {
            return invalid("accounts.user_id cannot be empty");
        }
        if !user_ids.insert(account.user_id.as_str()) {
            return invalid(format!("duplicate account '{}'", account.user_id));
        }
        if let Some(key) = &account.api_key {
            if key.is_empty() {
                return invalid(format!("account '{}' has an empty api_key", account.user_id));
            }
            if !api_keys.insert(key.as_str()) {
                return invalid(format!("account '{}' reuses an api_key", account.user_id));
            }
        }
        match (account.trial_start, account.trial_end) {
            (Some(start), Some(end)) if end <= start => {
                return invalid(format!(
                    "account '{}' trial_end must be after trial_start",
                    account.user_id
                ));
            }
            (Some(_), None) | (None, Some(_)) => {
                return invalid(format!(
                    "account '{}' needs both trial_start and trial_end",
                    account.user_id
                ));
            }
            _ => {}
        }
    }

    Ok(())
}

fn validate_timeout(field: &str, timeout: &TimeoutTier) -> Result<(), ConfigError> {
    if timeout.max_secs == 0 {
        return invalid(format!("{}.max_secs cannot be 0", field));
    }
    if timeout.base_secs > timeout.max_secs {
        return invalid(format!("{}.base_secs cannot exceed max_secs", field));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn config(extra: &str) -> Config {
        load_config_from_str(&format!("[auth]\nmethod = \"session\"\n{}", extra)).unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&config("")).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let err = validate_config(&config("[server]\nport = 0\n")).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_pool_size_zero_fails() {
        assert!(validate_config(&config("[workers]\npool_size = 0\n")).is_err());
    }

    #[test]
    fn test_validate_pro_endpoint() {
        let bad = config("[backends.pro]\nendpoint = \"documentai\"\napi_key = \"k\"\n");
        assert!(validate_config(&bad).is_err());

        let good = config("[backends.pro]\nendpoint = \"https://x.example/process\"\napi_key = \"k\"\n");
        assert!(validate_config(&good).is_ok());
    }

    #[test]
    fn test_validate_timeout_tiers() {
        let bad = config("[backends.standard.timeout]\nbase_secs = 60\nper_mib_secs = 1\nmax_secs = 30\n");
        assert!(validate_config(&bad).is_err());
    }

    #[test]
    fn test_validate_unknown_extension() {
        let bad = config("[intake]\nstandard_extensions = [\"pdf\", \"exe\"]\n");
        let err = validate_config(&bad).unwrap_err();
        assert!(err.to_string().contains("exe"));
    }

    #[test]
    fn test_validate_accounts() {
        let duplicate = config("[[accounts]]\nuser_id = \"a\"\n[[accounts]]\nuser_id = \"a\"\n");
        assert!(validate_config(&duplicate).is_err());

        let shared_key = config(
            "[[accounts]]\nuser_id = \"a\"\napi_key = \"k\"\n[[accounts]]\nuser_id = \"b\"\napi_key = \"k\"\n",
        );
        assert!(validate_config(&shared_key).is_err());

        let half_trial = config("[[accounts]]\nuser_id = \"a\"\ntrial_start = \"2024-01-01T00:00:00Z\"\n");
        assert!(validate_config(&half_trial).is_err());

        let backwards = config(
            "[[accounts]]\nuser_id = \"a\"\ntrial_start = \"2024-02-01T00:00:00Z\"\ntrial_end = \"2024-01-01T00:00:00Z\"\n",
        );
        assert!(validate_config(&backwards).is_err());
    }
}
