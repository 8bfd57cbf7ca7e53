use secrecy::Secret;
use serde::Deserialize;
use service_core::config::{self as core_config, get_env, parse_env};
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct BackofficeConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub mongodb: MongoConfig,
    pub storage: StorageConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub inventory: InventoryConfig,
    pub bootstrap: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub local_path: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: Secret<String>,
    pub expiry_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryConfig {
    pub low_stock_threshold: i64,
}

/// First admin account, created at startup when the users collection is empty.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub name: String,
    pub email: String,
    pub password: Secret<String>,
}

impl BackofficeConfig {
    pub fn load() -> Result<Self, AppError> {
        // Handles .env and the APP__ prefix for port, environment and logging.
        let common = core_config::Config::load()?;
        let is_prod = common.environment.is_prod();

        let bootstrap = match (
            env::var("BOOTSTRAP_ADMIN_EMAIL").ok(),
            env::var("BOOTSTRAP_ADMIN_PASSWORD").ok(),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdmin {
                name: get_env("BOOTSTRAP_ADMIN_NAME", Some("Administrator"), is_prod)?,
                email,
                password: Secret::new(password),
            }),
            _ => None,
        };

        let config = BackofficeConfig {
            service_name: get_env("SERVICE_NAME", Some("backoffice-service"), is_prod)?,
            service_version: get_env(
                "SERVICE_VERSION",
                Some(env!("CARGO_PKG_VERSION")),
                is_prod,
            )?,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", None, is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("backoffice_db"), is_prod)?,
            },
            storage: StorageConfig {
                local_path: get_env("STORAGE_LOCAL_PATH", Some("storage"), is_prod)?,
                max_upload_bytes: parse_env("STORAGE_MAX_UPLOAD_BYTES", Some("5242880"), is_prod)?,
            },
            jwt: JwtConfig {
                secret: Secret::new(get_env(
                    "JWT_SECRET",
                    (!is_prod).then_some("dev-only-jwt-secret-change-me"),
                    is_prod,
                )?),
                expiry_minutes: parse_env("JWT_EXPIRY_MINUTES", Some("720"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("5"), is_prod)?,
                login_window_seconds: parse_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
            },
            inventory: InventoryConfig {
                low_stock_threshold: parse_env("LOW_STOCK_THRESHOLD", Some("10"), is_prod)?,
            },
            bootstrap,
            common,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        use secrecy::ExposeSecret;

        if self.jwt.expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.inventory.low_stock_threshold < 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "LOW_STOCK_THRESHOLD must not be negative"
            )));
        }

        if self.common.environment.is_prod() {
            if self.jwt.secret.expose_secret().len() < 32 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be at least 32 characters in production"
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
        }

        Ok(())
    }
}
