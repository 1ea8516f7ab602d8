use identity_core::config::{get_env, Environment};
use identity_core::error::IdentityError;
use serde::Deserialize;
use std::env;

/// Full configuration for the identity engine.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub signing: SigningConfig,
    pub tokens: TokenConfig,
    pub otp: OtpConfig,
    pub lockout: LockoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Key material and lifetimes for locally signed tokens (temp tokens and the
/// default access-token signer).
#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    pub private_key_path: String,
    pub public_key_path: String,
    pub access_token_expiry_minutes: i64,
    pub temp_token_expiry_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    pub ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    pub max_failed_attempts: i32,
    pub lockout_minutes: i64,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, IdentityError> {
        dotenvy::dotenv().ok();

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| IdentityError::Config(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = IdentityConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            signing: SigningConfig {
                private_key_path: get_env("SIGNING_PRIVATE_KEY_PATH", None, is_prod)?,
                public_key_path: get_env("SIGNING_PUBLIC_KEY_PATH", None, is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
                temp_token_expiry_minutes: parse_env("TEMP_TOKEN_EXPIRY_MINUTES", "10", is_prod)?,
            },
            tokens: TokenConfig {
                access_token_expiry_minutes: parse_env(
                    "ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env("REFRESH_TOKEN_EXPIRY_DAYS", "7", is_prod)?,
            },
            otp: OtpConfig {
                ttl_seconds: parse_env("OTP_TTL_SECONDS", "600", is_prod)?,
            },
            lockout: LockoutConfig {
                max_failed_attempts: parse_env("LOCKOUT_MAX_FAILED_ATTEMPTS", "5", is_prod)?,
                lockout_minutes: parse_env("LOCKOUT_MINUTES", "15", is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), IdentityError> {
        if self.tokens.access_token_expiry_minutes <= 0 {
            return Err(IdentityError::Config(anyhow::anyhow!(
                "ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.tokens.refresh_token_expiry_days <= 0 {
            return Err(IdentityError::Config(anyhow::anyhow!(
                "REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.otp.ttl_seconds <= 0 {
            return Err(IdentityError::Config(anyhow::anyhow!(
                "OTP_TTL_SECONDS must be positive"
            )));
        }

        if self.lockout.max_failed_attempts <= 0 {
            return Err(IdentityError::Config(anyhow::anyhow!(
                "LOCKOUT_MAX_FAILED_ATTEMPTS must be positive"
            )));
        }

        Ok(())
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, IdentityError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| IdentityError::Config(anyhow::anyhow!("{}: {}", key, e)))
}
