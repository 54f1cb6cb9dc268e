// intent-relay/crates/intent-relay/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::redirect::PresentationConfig;
use crate::store::StoreBackend;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub store_backend: StoreBackend,
    pub request_timeout_seconds: u64,
    /// Consult `x-forwarded-for` / `x-real-ip` for the client address.
    pub trust_proxy_headers: bool,
    /// Interval of the expired-row sweep for stores without native expiry.
    pub purge_interval_seconds: u64,
    pub presentation: PresentationConfig,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("{} must be a boolean, got '{}'", name, other)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let store_backend = StoreBackend::parse(
            &var_or("STORE_BACKEND", "memory"),
            &var_or("STORE_PATH", "./data/intent-relay.db"),
        )?;

        let defaults = PresentationConfig::default();
        let presentation = PresentationConfig {
            app_scheme: var_or("APP_SCHEME", &defaults.app_scheme),
            android_package: var_or("ANDROID_PACKAGE", &defaults.android_package),
            ios_app_id: var_or("IOS_APP_ID", &defaults.ios_app_id),
            ios_store_url: var_or("IOS_STORE_URL", &defaults.ios_store_url),
            android_store_url: var_or("ANDROID_STORE_URL", &defaults.android_store_url),
            website_url: var_or("WEBSITE_URL", &defaults.website_url),
        };
        presentation.validate()?;

        Ok(Self {
            api_host: var_or("API_HOST", "127.0.0.1"),
            api_port: var_or("API_PORT", "3000")
                .parse()
                .context("API_PORT must be a port number")?,
            store_backend,
            request_timeout_seconds: var_or("REQUEST_TIMEOUT_SECONDS", "30")
                .parse()
                .context("REQUEST_TIMEOUT_SECONDS must be an integer")?,
            trust_proxy_headers: parse_bool(
                "TRUST_PROXY_HEADERS",
                &var_or("TRUST_PROXY_HEADERS", "true"),
            )?,
            purge_interval_seconds: var_or("PURGE_INTERVAL_SECONDS", "300")
                .parse()
                .context("PURGE_INTERVAL_SECONDS must be an integer")?,
            presentation,
        })
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- Store: {:?}", self.store_backend);
        info!("- Request Timeout: {}s", self.request_timeout_seconds);
        info!("- Trust Proxy Headers: {}", self.trust_proxy_headers);
        info!("- Purge Interval: {}s", self.purge_interval_seconds);
        info!("- App Scheme: {}", self.presentation.app_scheme);
        info!("- Website: {}", self.presentation.website_url);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid API address {}:{}", self.api_host, self.api_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            api_host: "127.0.0.1".to_string(),
            api_port: 3000,
            store_backend: StoreBackend::Memory,
            request_timeout_seconds: 30,
            trust_proxy_headers: true,
            purge_interval_seconds: 300,
            presentation: PresentationConfig::default(),
        }
    }

    #[test]
    fn test_api_addr_parsing() {
        let config = create_test_config();
        let addr = config.api_addr().unwrap();

        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_api_addr_with_zero_address() {
        let mut config = create_test_config();
        config.api_host = "0.0.0.0".to_string();
        config.api_port = 5000;

        let addr = config.api_addr().unwrap();
        assert_eq!(addr.port(), 5000);
        assert_eq!(addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_api_addr_rejects_hostname() {
        let mut config = create_test_config();
        config.api_host = "not a host".to_string();
        assert!(config.api_addr().is_err());
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("X", "TRUE").unwrap());
        assert!(parse_bool("X", "1").unwrap());
        assert!(!parse_bool("X", "off").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_var_or_falls_back_for_unset() {
        assert_eq!(var_or("INTENT_RELAY_TEST_SURELY_UNSET", "fallback"), "fallback");
    }
}
