use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the grid-bot service
    pub grid_url: String,
    /// Base URL of the referral service
    pub referral_url: String,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Listen address for the proxy server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Listen port for the proxy server
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Parameters handed to the trading-account SDK when a key is created.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    #[serde(default = "default_duration_days")]
    pub duration_days: u32,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    /// How long a registration request id stays in the ledger
    #[serde(default = "default_request_ttl_secs")]
    pub request_ttl_secs: u64,
}

fn default_duration_days() -> u32 {
    365
}

fn default_scope() -> String {
    "read,trading".to_string()
}

fn default_tag() -> String {
    "strategyAutoCreated".to_string()
}

fn default_request_ttl_secs() -> u64 {
    300
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            duration_days: default_duration_days(),
            scope: default_scope(),
            tag: default_tag(),
            request_ttl_secs: default_request_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("backend.grid_url", "http://localhost:3001")?
            .set_default("backend.referral_url", "http://localhost:3002")?
            .set_default("backend.timeout_ms", 10_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overrides (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("GRIDGATE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // GRIDGATE_BACKEND__GRID_URL, GRIDGATE_PROXY__PORT, ...
            .add_source(
                Environment::with_prefix("GRIDGATE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (name, raw) in [
            ("backend.grid_url", &self.backend.grid_url),
            ("backend.referral_url", &self.backend.referral_url),
        ] {
            match url::Url::parse(raw) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => errors.push(format!(
                    "{name} must use http or https, got '{}'",
                    parsed.scheme()
                )),
                Err(e) => errors.push(format!("{name} is not a valid URL: {e}")),
            }
        }

        if self.backend.timeout_ms == 0 {
            errors.push("backend.timeout_ms must be positive".to_string());
        }

        if self.provisioning.duration_days == 0 {
            errors.push("provisioning.duration_days must be positive".to_string());
        }

        if self.provisioning.scope.trim().is_empty() {
            errors.push("provisioning.scope must not be empty".to_string());
        }

        if self.provisioning.request_ttl_secs == 0 {
            errors.push("provisioning.request_ttl_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            backend: BackendConfig {
                grid_url: "http://grid.internal:3001".to_string(),
                referral_url: "https://referral.internal".to_string(),
                timeout_ms: 5_000,
            },
            proxy: ProxyConfig::default(),
            provisioning: ProvisioningConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_provisioning_defaults() {
        let cfg = ProvisioningConfig::default();
        assert_eq!(cfg.duration_days, 365);
        assert_eq!(cfg.scope, "read,trading");
        assert_eq!(cfg.tag, "strategyAutoCreated");
        assert_eq!(cfg.request_ttl_secs, 300);
    }

    #[test]
    fn test_validate_accepts_sample() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let mut cfg = sample();
        cfg.backend.grid_url = "not a url".to_string();
        cfg.backend.referral_url = "ftp://referral.internal".to_string();

        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("backend.grid_url"));
        assert!(errors[1].contains("http or https"));
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let cfg = AppConfig::load_from("/nonexistent/gridgate-config").unwrap();
        assert_eq!(cfg.proxy.port, 8080);
        assert_eq!(cfg.provisioning.duration_days, 365);
        assert!(cfg.backend.grid_url.starts_with("http://"));
    }
}
