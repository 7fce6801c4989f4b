use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use secrecy::SecretString;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Prefix for download links handed to customers.
    pub public_base_url: String,
    pub catalog_path: PathBuf,
    pub asset_root: PathBuf,
    pub currency: String,
    pub paypal: PayPalConfig,
    pub session_ttl: Duration,
    pub download_ttl: chrono::Duration,
    pub pending_order_ttl: chrono::Duration,
    pub sweep_interval: Duration,
    /// HMAC key for bearer tokens. Account routes answer 500 without it.
    pub jwt_secret: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("APP_PORT", 3000u16);

        let paypal = PayPalConfig {
            base_url: env::var("PAYPAL_BASE_URL")
                .unwrap_or_else(|_| "https://api-m.sandbox.paypal.com".to_string()),
            client_id: env::var("PAYPAL_CLIENT_ID").context("PAYPAL_CLIENT_ID is not set")?,
            client_secret: SecretString::from(
                env::var("PAYPAL_CLIENT_SECRET").context("PAYPAL_CLIENT_SECRET is not set")?,
            ),
        };

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{host}:{port}"));

        Ok(Self {
            database_url,
            host,
            port,
            public_base_url,
            catalog_path: env::var("CATALOG_PATH")
                .unwrap_or_else(|_| "data/catalog.json".to_string())
                .into(),
            asset_root: env::var("ASSET_ROOT")
                .unwrap_or_else(|_| "assets".to_string())
                .into(),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "USD".to_string()),
            paypal,
            session_ttl: Duration::from_secs(parse_or("SESSION_TTL_SECS", 7 * 24 * 60 * 60)),
            download_ttl: chrono::Duration::hours(parse_or("DOWNLOAD_TTL_HOURS", 72)),
            pending_order_ttl: chrono::Duration::hours(parse_or("PENDING_ORDER_TTL_HOURS", 24)),
            sweep_interval: Duration::from_secs(parse_or("SWEEP_INTERVAL_SECS", 3600)),
            jwt_secret: env::var("JWT_SECRET").ok().map(SecretString::from),
        })
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
