use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Process-wide configuration, loaded once in the composition root from
/// environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub helm_chart_path: String,
    pub helm_values_file: String,
    pub helm_env_values_file: String,
    pub provisioning_timeout: Duration,
    pub provisioning_poll_interval: Duration,
    pub provisioning_max_workers: usize,
    pub base_domain: String,
    pub tls_enabled: bool,
    pub helm_exec_timeout: Duration,
    pub kubeconfig: Option<String>,
    pub listen_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Ok(Config {
            database_url: env_or("DATABASE_URL", "sqlite://store-provisioner.db"),
            helm_chart_path: env_or("HELM_CHART_PATH", "helm/store"),
            helm_values_file: env_or("HELM_VALUES_FILE", "values.yaml"),
            helm_env_values_file: env_or("HELM_ENV_VALUES_FILE", "values-local.yaml"),
            provisioning_timeout: parse_secs("PROVISIONING_TIMEOUT_SECONDS", 600)?,
            provisioning_poll_interval: parse_secs("PROVISIONING_POLL_INTERVAL_SECONDS", 5)?,
            provisioning_max_workers: parse_usize("PROVISIONING_MAX_WORKERS", 5)?,
            base_domain: env_or("BASE_DOMAIN", "localhost"),
            tls_enabled: parse_bool("TLS_ENABLED", false)?,
            helm_exec_timeout: parse_secs("HELM_EXEC_TIMEOUT_SECONDS", 300)?,
            kubeconfig: env::var("KUBECONFIG").ok(),
            listen_addr: env_or("LISTEN_ADDR", "0.0.0.0:8080"),
        })
    }

    pub fn store_scheme(&self) -> &'static str {
        if self.tls_enabled { "https" } else { "http" }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_secs(key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(Duration::from_secs(default)),
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                value: raw,
                reason: e.to_string(),
            }),
    }
}

fn parse_usize(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse::<usize>().map_err(|e| ConfigError::InvalidValue {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key,
                value: raw,
                reason: "expected a boolean".to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_when_unset() {
        // we can't safely unset process-wide env vars in a parallel test
        // binary, so we just check the parse helpers directly.
        assert_eq!(parse_secs("X_UNSET_TIMEOUT", 600).unwrap(), Duration::from_secs(600));
        assert_eq!(parse_usize("X_UNSET_WORKERS", 5).unwrap(), 5);
        assert!(!parse_bool("X_UNSET_TLS", false).unwrap());
    }

    #[test]
    fn rejects_garbage_numeric_value() {
        unsafe {
            env::set_var("X_CONFIG_TEST_TIMEOUT", "not-a-number");
        }
        let err = parse_secs("X_CONFIG_TEST_TIMEOUT", 600).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        unsafe {
            env::remove_var("X_CONFIG_TEST_TIMEOUT");
        }
    }
}
