use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crate::workflow::roles::{parse_role_list, Role, TransitionPolicy};

/// ✅ Global Config stored in `OnceLock`
static CONFIG: OnceLock<Arc<Config>> = OnceLock::new();

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub log_dir: PathBuf,
    pub log_level: tracing::Level,
    pub permission_cache_ttl_secs: u64,
    pub transition_policy: TransitionPolicy,
}

impl Config {
    /// ✅ Load environment variables and set defaults
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env only once

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string()),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 10)?,
            log_dir: PathBuf::from(env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string())),
            log_level: parse_or("LOG_LEVEL", tracing::Level::INFO)?,
            permission_cache_ttl_secs: parse_or("PERMISSION_CACHE_TTL_SECS", 600)?,
            transition_policy: policy_from_env()?,
        })
    }

    /// ✅ Initialize the global config
    pub fn init() -> anyhow::Result<Arc<Config>> {
        let config = Arc::new(Self::from_env()?);
        CONFIG
            .set(config.clone())
            .map_err(|_| anyhow::anyhow!("Config already initialized"))?;
        Ok(config)
    }

    /// ✅ Access to Config, `None` before `init`
    pub fn try_get() -> Option<Arc<Config>> {
        CONFIG.get().cloned()
    }
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", key, e)),
        Err(_) => Ok(default),
    }
}

fn roles_or(key: &str, default: &[Role]) -> anyhow::Result<Vec<Role>> {
    match env::var(key) {
        Ok(raw) => parse_role_list(&raw).map_err(|e| anyhow::anyhow!("{}: {}", key, e)),
        Err(_) => Ok(default.to_vec()),
    }
}

/// Role sets for the gated item transitions, each overridable on its own.
fn policy_from_env() -> anyhow::Result<TransitionPolicy> {
    let defaults = TransitionPolicy::default();
    Ok(TransitionPolicy {
        payment: roles_or("PAYMENT_ROLES", &defaults.payment)?,
        delivery: roles_or("DELIVERY_ROLES", &defaults.delivery)?,
        warehouse: roles_or("WAREHOUSE_ROLES", &defaults.warehouse)?,
        acceptance: roles_or("ACCEPTANCE_ROLES", &defaults.acceptance)?,
    })
}
