use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::pricing::FeeSchedule;
use crate::sweeper::SweeperConfig;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set when RUST_ENV=production")]
    MissingSecret(&'static str),
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Bearer key for API calls; also the webhook HMAC key.
    pub secret_key: String,
    pub callback_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: String,
    pub cors_allowed_origins: String,
    pub production: bool,
    pub gateway: GatewayConfig,
    pub ticket_signing_secret: String,
    pub fees: FeeSchedule,
    pub sweeper: SweeperConfig,
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str, default: &str) -> String {
        (self.lookup)(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        match (self.lookup)(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Config: invalid value '{}' for {}, using {}", raw, key, default);
                default
            }),
            None => default,
        }
    }

    /// Like `parse`, but zero and negative values also fall back.
    fn positive<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + Copy + std::fmt::Display + PartialOrd + Default,
    {
        let value = self.parse(key, default);
        if value <= T::default() {
            tracing::warn!("Config: {} must be positive, using {}", key, default);
            return default;
        }
        value
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let vars = Vars { lookup };
        let defaults = FeeSchedule::default();

        Self {
            database_url: vars.string("DATABASE_URL", "postgres://localhost/boxoffice"),
            database_max_connections: vars.parse("DATABASE_MAX_CONNECTIONS", 10),
            bind_addr: vars.string("BIND_ADDR", "0.0.0.0:3001"),
            cors_allowed_origins: vars.string("CORS_ALLOWED_ORIGINS", cors::DEFAULT_ALLOWED_ORIGINS),
            production: vars.string("RUST_ENV", "development").to_lowercase() == "production",
            gateway: GatewayConfig {
                base_url: vars.string("PAYSTACK_BASE_URL", "https://api.paystack.co"),
                secret_key: vars.string("PAYSTACK_SECRET_KEY", ""),
                callback_url: vars.string(
                    "PAYMENT_CALLBACK_URL",
                    "http://localhost:3000/checkout/callback",
                ),
                timeout: Duration::from_secs(vars.parse("GATEWAY_TIMEOUT_SECS", 15)),
            },
            ticket_signing_secret: vars.string("TICKET_SIGNING_SECRET", ""),
            fees: FeeSchedule {
                threshold: vars.parse("FEE_THRESHOLD", defaults.threshold),
                small_rate_bps: vars.parse("FEE_SMALL_RATE_BPS", defaults.small_rate_bps),
                premium_rate_bps: vars.parse("FEE_PREMIUM_RATE_BPS", defaults.premium_rate_bps),
                premium_flat_fee: vars.parse("FEE_PREMIUM_FLAT", defaults.premium_flat_fee),
                vat_rate_bps: vars.parse("FEE_VAT_RATE_BPS", defaults.vat_rate_bps),
                gateway_fee_bps: vars.parse("GATEWAY_FEE_BPS", defaults.gateway_fee_bps),
                gateway_fee_flat: vars.parse("GATEWAY_FEE_FLAT", defaults.gateway_fee_flat),
            },
            sweeper: SweeperConfig {
                interval: Duration::from_secs(vars.positive("SWEEP_INTERVAL_SECS", 60)),
                reservation_ttl: Duration::from_secs(vars.positive("RESERVATION_TTL_SECS", 900)),
                batch_size: vars.positive("SWEEP_BATCH_SIZE", 100),
            },
        }
    }

    /// Empty secrets are tolerated in development only.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.production {
            if self.gateway.secret_key.is_empty() || self.ticket_signing_secret.is_empty() {
                tracing::warn!("Config: running with empty signing secrets (development mode)");
            }
            return Ok(());
        }
        if self.gateway.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret("PAYSTACK_SECRET_KEY"));
        }
        if self.ticket_signing_secret.is_empty() {
            return Err(ConfigError::MissingSecret("TICKET_SIGNING_SECRET"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_match_fee_schedule() {
        let config = config(&[]);
        assert_eq!(config.fees, FeeSchedule::default());
        assert_eq!(config.sweeper.reservation_ttl, Duration::from_secs(900));
        assert_eq!(config.bind_addr, "0.0.0.0:3001");
        assert!(!config.production);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_number_falls_back_to_default() {
        let config = config(&[("FEE_THRESHOLD", "lots"), ("SWEEP_BATCH_SIZE", "25")]);
        assert_eq!(config.fees.threshold, 500_000);
        assert_eq!(config.sweeper.batch_size, 25);
    }

    #[test]
    fn test_zero_sweeper_settings_fall_back_to_defaults() {
        let config = config(&[
            ("SWEEP_INTERVAL_SECS", "0"),
            ("RESERVATION_TTL_SECS", "0"),
            ("SWEEP_BATCH_SIZE", "-5"),
        ]);
        assert_eq!(config.sweeper.interval, Duration::from_secs(60));
        assert_eq!(config.sweeper.reservation_ttl, Duration::from_secs(900));
        assert_eq!(config.sweeper.batch_size, 100);

        let tuned = self::config(&[("SWEEP_INTERVAL_SECS", "5"), ("SWEEP_BATCH_SIZE", "1")]);
        assert_eq!(tuned.sweeper.interval, Duration::from_secs(5));
        assert_eq!(tuned.sweeper.batch_size, 1);
    }

    #[test]
    fn test_production_requires_secrets() {
        let missing = config(&[("RUST_ENV", "Production")]);
        assert!(matches!(
            missing.validate(),
            Err(ConfigError::MissingSecret("PAYSTACK_SECRET_KEY"))
        ));

        let complete = config(&[
            ("RUST_ENV", "production"),
            ("PAYSTACK_SECRET_KEY", "sk_live_x"),
            ("TICKET_SIGNING_SECRET", "gate"),
        ]);
        assert!(complete.validate().is_ok());
    }
}
