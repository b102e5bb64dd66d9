//! Runtime settings loaded from environment variables.
//!
//! `.env` is read by `main` through `dotenvy` before [`Settings::from_env`]
//! runs. Parsing is written against a lookup closure so tests can feed
//! variables without touching the process environment.

use crate::errors::{Error, Result};
use std::fmt;
use std::path::PathBuf;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/course_keeper.sqlite?mode=rwc";
const DEFAULT_SERVER_PORT: u16 = 8000;
const DEFAULT_PAYME_AMOUNT: i64 = 9_700_000;
const DEFAULT_CHECKOUT_URL: &str = "https://payme.uz/checkout";
const DEFAULT_TEST_CHECKOUT_URL: &str = "https://test.payme.uz/checkout";
const DEFAULT_COURSES_CONFIG: &str = "config.toml";

/// Complete application settings
#[derive(Clone)]
pub struct Settings {
    /// Telegram bot token
    pub bot_token: String,
    /// `SeaORM` connection string
    pub database_url: String,
    /// Port the webhook server listens on
    pub server_port: u16,
    /// Payment gateway credentials and URLs
    pub payme: PaymeSettings,
    /// Product sold when no course is configured
    pub default_product: ProductDefaults,
    /// Path of the TOML course seed file
    pub courses_config: PathBuf,
}

/// Payment gateway settings
#[derive(Clone)]
pub struct PaymeSettings {
    /// Merchant id used in checkout links
    pub merchant_id: String,
    /// Production secret key
    pub secret_key: String,
    /// Sandbox secret key
    pub test_key: String,
    /// Selects the sandbox key and checkout URL
    pub test_mode: bool,
    /// Production checkout base URL
    pub checkout_url: String,
    /// Sandbox checkout base URL
    pub test_checkout_url: String,
}

impl PaymeSettings {
    /// Secret the gateway must present for the configured mode.
    #[must_use]
    pub fn active_key(&self) -> &str {
        if self.test_mode {
            &self.test_key
        } else {
            &self.secret_key
        }
    }

    /// Checkout base URL for the configured mode.
    #[must_use]
    pub fn active_checkout_url(&self) -> &str {
        if self.test_mode {
            &self.test_checkout_url
        } else {
            &self.checkout_url
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("bot_token", &"<redacted>")
            .field("database_url", &self.database_url)
            .field("server_port", &self.server_port)
            .field("payme", &self.payme)
            .field("default_product", &self.default_product)
            .field("courses_config", &self.courses_config)
            .finish()
    }
}

impl fmt::Debug for PaymeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymeSettings")
            .field("merchant_id", &self.merchant_id)
            .field("secret_key", &"<redacted>")
            .field("test_key", &"<redacted>")
            .field("test_mode", &self.test_mode)
            .field("checkout_url", &self.checkout_url)
            .field("test_checkout_url", &self.test_checkout_url)
            .finish()
    }
}

/// Single-product deployment defaults, used when no course is active
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDefaults {
    /// Price in minor currency units
    pub price: i64,
    /// Private channel granted on payment
    pub channel_id: Option<i64>,
    /// Public link to the private channel
    pub channel_url: Option<String>,
}

impl Settings {
    /// Loads settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| Error::Config {
                message: format!("{key} must be set"),
            })
        };

        let payme = PaymeSettings {
            merchant_id: var("PAYME_MERCHANT_ID").unwrap_or_default(),
            secret_key: var("PAYME_SECRET_KEY").unwrap_or_default(),
            test_key: var("PAYME_TEST_KEY").unwrap_or_default(),
            test_mode: var("PAYME_TEST_MODE")
                .is_some_and(|value| value.trim().eq_ignore_ascii_case("true")),
            checkout_url: var("PAYME_CHECKOUT_URL")
                .unwrap_or_else(|| DEFAULT_CHECKOUT_URL.to_string()),
            test_checkout_url: var("PAYME_TEST_CHECKOUT_URL")
                .unwrap_or_else(|| DEFAULT_TEST_CHECKOUT_URL.to_string()),
        };

        if payme.active_key().is_empty() {
            return Err(Error::Config {
                message: if payme.test_mode {
                    "PAYME_TEST_KEY must be set when PAYME_TEST_MODE is true".to_string()
                } else {
                    "PAYME_SECRET_KEY must be set".to_string()
                },
            });
        }

        let default_product = ProductDefaults {
            price: parse_var(&var, "PAYME_AMOUNT")?.unwrap_or(DEFAULT_PAYME_AMOUNT),
            channel_id: parse_var(&var, "PRIVATE_CHANNEL_ID")?,
            channel_url: var("PRIVATE_CHANNEL_URL"),
        };
        if default_product.price <= 0 {
            return Err(Error::Config {
                message: "PAYME_AMOUNT must be positive".to_string(),
            });
        }

        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            server_port: parse_var(&var, "SERVER_PORT")?.unwrap_or(DEFAULT_SERVER_PORT),
            payme,
            default_product,
            courses_config: var("COURSES_CONFIG")
                .map_or_else(|| PathBuf::from(DEFAULT_COURSES_CONFIG), PathBuf::from),
        })
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| Error::Config {
                message: format!("{key} is invalid ({raw}): {e}"),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn load(pairs: &[(&str, &str)]) -> Result<Settings> {
        let map = vars(pairs);
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_applied() {
        let settings = load(&[("BOT_TOKEN", "t"), ("PAYME_SECRET_KEY", "live")]).unwrap();
        assert_eq!(settings.server_port, 8000);
        assert_eq!(settings.default_product.price, 9_700_000);
        assert_eq!(settings.default_product.channel_id, None);
        assert!(!settings.payme.test_mode);
        assert_eq!(settings.payme.active_key(), "live");
        assert_eq!(
            settings.payme.active_checkout_url(),
            "https://payme.uz/checkout"
        );
        assert_eq!(settings.courses_config, PathBuf::from("config.toml"));
    }

    #[test]
    fn test_test_mode_selects_test_key() {
        let settings = load(&[
            ("BOT_TOKEN", "t"),
            ("PAYME_SECRET_KEY", "live"),
            ("PAYME_TEST_KEY", "sandbox"),
            ("PAYME_TEST_MODE", "TRUE"),
            ("PRIVATE_CHANNEL_ID", "-1001234"),
        ])
        .unwrap();
        assert_eq!(settings.payme.active_key(), "sandbox");
        assert_eq!(settings.default_product.channel_id, Some(-1_001_234));
        assert!(settings.payme.active_checkout_url().contains("test"));
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let result = load(&[("PAYME_SECRET_KEY", "live")]);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_missing_active_key_is_config_error() {
        let result = load(&[
            ("BOT_TOKEN", "t"),
            ("PAYME_SECRET_KEY", "live"),
            ("PAYME_TEST_MODE", "true"),
        ]);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let result = load(&[
            ("BOT_TOKEN", "t"),
            ("PAYME_SECRET_KEY", "live"),
            ("SERVER_PORT", "eighty"),
        ]);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let settings = load(&[("BOT_TOKEN", "t"), ("PAYME_SECRET_KEY", "hunter2")]).unwrap();
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("bot_token: \"t\""));
    }
}
