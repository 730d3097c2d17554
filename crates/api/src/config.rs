//! Application configuration loaded from the environment

use std::time::Duration;

/// Default Google JWKS endpoint used to verify federated ID tokens
pub const DEFAULT_GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Minimum signing secret length (HS256 wants at least 256 bits of key material)
const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,
    /// When set, challenges live in Redis instead of process memory
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiry_days: i64,
    /// Expected audience of federated ID tokens. Empty disables federated login.
    pub google_client_id: String,
    pub google_jwks_url: String,
    pub otp_ttl: Duration,
    pub resend_api_key: Option<String>,
    pub mail_from: String,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                reason: format!("must be at least {} bytes", MIN_JWT_SECRET_LEN),
            });
        }

        Ok(Self {
            bind_address: optional("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:5000".to_string()),
            database_url: required("DATABASE_URL")?,
            redis_url: optional("REDIS_URL"),
            jwt_secret,
            jwt_expiry_days: parse_or("JWT_EXPIRY_DAYS", 7)?,
            google_client_id: optional("GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_jwks_url: optional("GOOGLE_JWKS_URL")
                .unwrap_or_else(|| DEFAULT_GOOGLE_JWKS_URL.to_string()),
            otp_ttl: Duration::from_secs(parse_or("OTP_TTL_SECONDS", 300)?),
            resend_api_key: optional("RESEND_API_KEY"),
            mail_from: optional("MAIL_FROM")
                .unwrap_or_else(|| "Sweet Shop <no-reply@sweetshop.local>".to_string()),
            allowed_origins: optional("ALLOWED_ORIGINS")
                .unwrap_or_else(|| "http://localhost:5173,http://127.0.0.1:5173".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn federation_enabled(&self) -> bool {
        !self.google_client_id.is_empty()
    }
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn clear_env() {
        for name in [
            "BIND_ADDRESS",
            "DATABASE_URL",
            "REDIS_URL",
            "JWT_SECRET",
            "JWT_EXPIRY_DAYS",
            "GOOGLE_CLIENT_ID",
            "GOOGLE_JWKS_URL",
            "OTP_TTL_SECONDS",
            "RESEND_API_KEY",
            "MAIL_FROM",
            "ALLOWED_ORIGINS",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_applied() {
        clear_env();
        std::env::set_var("JWT_SECRET", SECRET);
        std::env::set_var("DATABASE_URL", "postgres://localhost/sweetshop");

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:5000");
        assert_eq!(config.jwt_expiry_days, 7);
        assert_eq!(config.otp_ttl, Duration::from_secs(300));
        assert_eq!(config.google_jwks_url, DEFAULT_GOOGLE_JWKS_URL);
        assert!(config.redis_url.is_none());
        assert!(!config.federation_enabled());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_secret_fails() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/sweetshop");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_short_secret_rejected() {
        clear_env();
        std::env::set_var("JWT_SECRET", "short");
        std::env::set_var("DATABASE_URL", "postgres://localhost/sweetshop");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "JWT_SECRET", .. }));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_origins_and_overrides_parsed() {
        clear_env();
        std::env::set_var("JWT_SECRET", SECRET);
        std::env::set_var("DATABASE_URL", "postgres://localhost/sweetshop");
        std::env::set_var("ALLOWED_ORIGINS", "https://a.example, https://b.example,");
        std::env::set_var("OTP_TTL_SECONDS", "60");
        std::env::set_var("GOOGLE_CLIENT_ID", "client-123.apps.googleusercontent.com");

        let config = Config::from_env().unwrap();
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.otp_ttl, Duration::from_secs(60));
        assert!(config.federation_enabled());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_bad_number_reported() {
        clear_env();
        std::env::set_var("JWT_SECRET", SECRET);
        std::env::set_var("DATABASE_URL", "postgres://localhost/sweetshop");
        std::env::set_var("JWT_EXPIRY_DAYS", "seven");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "JWT_EXPIRY_DAYS", .. }));
        clear_env();
    }
}
