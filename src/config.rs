// config.rs
use std::env;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mpesa_consumer_key: String,
    pub mpesa_consumer_secret: String,
    pub mpesa_short_code: String,
    pub mpesa_passkey: String,
    pub mpesa_callback_url: String,
    pub mpesa_environment: String,
}

impl AppConfig {
    /// Loads gateway credentials from the environment. Every credential is
    /// required; a missing one disables the payment service entirely rather
    /// than letting a half-configured client issue requests.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mpesa_environment =
            env::var("MPESA_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string());

        Ok(AppConfig {
            mpesa_consumer_key: require_var("MPESA_CONSUMER_KEY")?,
            mpesa_consumer_secret: require_var("MPESA_CONSUMER_SECRET")?,
            mpesa_short_code: require_var("MPESA_SHORT_CODE")?,
            mpesa_passkey: require_var("MPESA_PASSKEY")?,
            mpesa_callback_url: require_var("MPESA_CALLBACK_URL")?,
            mpesa_environment,
        })
    }

    pub fn is_production(&self) -> bool {
        self.mpesa_environment == "production"
    }

    /// (auth_url, stk_url) for the configured Daraja environment.
    pub fn get_mpesa_urls(&self) -> (String, String) {
        let base_url = if self.is_production() {
            "https://api.safaricom.co.ke"
        } else {
            "https://sandbox.safaricom.co.ke"
        };

        let auth_url = format!("{}/oauth/v1/generate?grant_type=client_credentials", base_url);
        let stk_url = format!("{}/mpesa/stkpush/v1/processrequest", base_url);

        (auth_url, stk_url)
    }
}

fn require_var(name: &str) -> Result<String> {
    env::var(name).map_err(|_| AppError::configuration(format!("{} must be set", name)))
}
