use std::str::FromStr;

use beacon_core::ledger::{DEFAULT_DAILY_CAP, DEFAULT_WRITE_TIMEOUT};
use beacon_core::signature::DEFAULT_TOLERANCE_SECS;
use beacon_core::types::Xp;

use crate::auth::jwt::JwtConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration loaded from environment variables.
///
/// All fields except `DATABASE_URL` and `JWT_SECRET` have defaults suitable
/// for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins, from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background tasks to drain.
    pub shutdown_timeout_secs: u64,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub stripe_webhook_secret: Option<String>,
    pub shopify_webhook_secret: Option<String>,
    /// Secret key for payment-intent lookups against the Stripe API.
    pub stripe_api_key: Option<String>,
    /// Enables `/l/{code}` signed links when set.
    pub signed_link_secret: Option<String>,
    pub xp_daily_cap: Xp,
    pub ledger_timeout_ms: u64,
    /// Where notifications are forwarded. Delivery is off when unset.
    pub notify_webhook_url: Option<String>,
    pub webhook_tolerance_secs: i64,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                            | Default                 |
    /// |------------------------------------|-------------------------|
    /// | `HOST`                             | `0.0.0.0`               |
    /// | `PORT`                             | `3000`                  |
    /// | `CORS_ORIGINS`                     | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`             | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`            | `30`                    |
    /// | `DATABASE_URL`                     | required                |
    /// | `JWT_SECRET`                       | required                |
    /// | `XP_DAILY_CAP`                     | `500`                   |
    /// | `LEDGER_TIMEOUT_MS`                | `750`                   |
    /// | `WEBHOOK_SIGNATURE_TOLERANCE_SECS` | `300`                   |
    /// | `LOG_FORMAT`                       | `text`                  |
    ///
    /// `STRIPE_WEBHOOK_SECRET`, `SHOPIFY_WEBHOOK_SECRET`, `STRIPE_API_KEY`,
    /// `SIGNED_LINK_SECRET` and `NOTIFY_WEBHOOK_URL` are optional; the
    /// feature they guard is disabled when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let cors_origins = env
            .string("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let log_format = match env.string("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid { name: "LOG_FORMAT", value: other.into() })
            }
        };

        Ok(Self {
            host: env.string("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: env.parse("PORT", 3000)?,
            cors_origins,
            request_timeout_secs: env.parse("REQUEST_TIMEOUT_SECS", 30)?,
            shutdown_timeout_secs: env.parse("SHUTDOWN_TIMEOUT_SECS", 30)?,
            database_url: env.required("DATABASE_URL")?,
            jwt: JwtConfig::new(env.required("JWT_SECRET")?, env.parse("JWT_ACCESS_EXPIRY_MINS", 15)?),
            stripe_webhook_secret: env.string("STRIPE_WEBHOOK_SECRET"),
            shopify_webhook_secret: env.string("SHOPIFY_WEBHOOK_SECRET"),
            stripe_api_key: env.string("STRIPE_API_KEY"),
            signed_link_secret: env.string("SIGNED_LINK_SECRET"),
            xp_daily_cap: env.parse("XP_DAILY_CAP", DEFAULT_DAILY_CAP)?,
            ledger_timeout_ms: env.parse("LEDGER_TIMEOUT_MS", DEFAULT_WRITE_TIMEOUT.as_millis() as u64)?,
            notify_webhook_url: env.string("NOTIFY_WEBHOOK_URL"),
            webhook_tolerance_secs: env.parse("WEBHOOK_SIGNATURE_TOLERANCE_SECS", DEFAULT_TOLERANCE_SECS)?,
            log_format,
        })
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Non-empty value or `None`.
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.string(name).ok_or(ConfigError::Missing(name))
    }

    fn parse<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.string(name) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|name| map.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 2] =
        [("DATABASE_URL", "postgres://localhost/beacon"), ("JWT_SECRET", "s3cret")];

    #[test]
    fn defaults_apply() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.xp_daily_cap, 500);
        assert_eq!(config.ledger_timeout_ms, 750);
        assert_eq!(config.webhook_tolerance_secs, 300);
        assert_eq!(config.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.signed_link_secret.is_none());
    }

    #[test]
    fn missing_database_url_is_an_error() {
        assert_matches!(load(&[("JWT_SECRET", "x")]), Err(ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("XP_DAILY_CAP", "lots"));
        assert_matches!(load(&vars), Err(ConfigError::Invalid { name: "XP_DAILY_CAP", .. }));
    }

    #[test]
    fn overrides_and_lists_parse() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("CORS_ORIGINS", "https://a.example, https://b.example,"),
            ("LOG_FORMAT", "json"),
            ("SIGNED_LINK_SECRET", "links"),
            ("NOTIFY_WEBHOOK_URL", " "),
        ]);
        let config = load(&vars).unwrap();
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.signed_link_secret.as_deref(), Some("links"));
        assert!(config.notify_webhook_url.is_none());
    }
}
