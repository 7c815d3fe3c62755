// services/mpesa_service.rs
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::Utc;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub expires_in: String,
}

#[derive(Debug, Serialize)]
pub struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: String,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

#[derive(Debug, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
    #[serde(rename = "CustomerMessage")]
    pub customer_message: String,
}

/// Normalizes a Kenyan subscriber number to the canonical 254XXXXXXXXX form
/// Daraja expects. Accepts international (`254…`, `+254…`), leading-zero
/// local (`07…`/`01…`) and bare nine-digit forms; anything else is rejected
/// before a single byte goes out on the wire.
pub fn normalize_phone(phone: &str) -> Result<String> {
    let phone = phone.trim();

    let normalized = if let Some(rest) = phone.strip_prefix("+254") {
        format!("254{}", rest)
    } else if phone.starts_with("254") && phone.len() == 12 {
        phone.to_string()
    } else if phone.starts_with('0') && phone.len() == 10 {
        format!("254{}", &phone[1..])
    } else if (phone.starts_with('7') || phone.starts_with('1')) && phone.len() == 9 {
        format!("254{}", phone)
    } else {
        return Err(AppError::invalid_data(format!(
            "Unrecognized phone number format: {}",
            phone
        )));
    };

    if normalized.len() != 12 || !normalized.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::invalid_data(format!(
            "Unrecognized phone number format: {}",
            phone
        )));
    }

    Ok(normalized)
}

/// Daraja takes whole shillings only.
pub fn validate_amount(amount: f64) -> Result<u64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::invalid_data("Amount must be greater than 0"));
    }
    if amount.fract() != 0.0 {
        return Err(AppError::invalid_data("Amount must be a whole number"));
    }
    Ok(amount as u64)
}

/// STK password: base64(shortcode + passkey + timestamp).
pub fn daraja_password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    base64.encode(format!("{}{}{}", short_code, passkey, timestamp))
}

#[derive(Debug, Clone)]
pub struct MpesaService {
    config: AppConfig,
    client: Client,
    cached_token: Arc<RwLock<Option<(String, chrono::DateTime<Utc>)>>>,
}

impl MpesaService {
    pub fn new(config: AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        MpesaService {
            config,
            client,
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().unwrap();
            if let Some((token, expiry)) = cached.as_ref() {
                if *expiry > Utc::now() + chrono::Duration::minutes(5) {
                    return Ok(token.clone());
                }
            }
        }

        info!("Requesting new Daraja access token");
        let auth_string = format!(
            "{}:{}",
            self.config.mpesa_consumer_key, self.config.mpesa_consumer_secret
        );
        let encoded_auth = base64.encode(auth_string);

        let (auth_url, _) = self.config.get_mpesa_urls();

        let response = self
            .client
            .get(&auth_url)
            .header(header::AUTHORIZATION, format!("Basic {}", encoded_auth))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Failed to get access token: {} - {}", status, body);
            return Err(AppError::MpesaAuth(format!("token request returned {}", status)));
        }

        let auth_response: AuthResponse = response
            .json()
            .await
            .map_err(|e| AppError::MpesaAuth(format!("malformed token response: {}", e)))?;

        {
            let expiry_time = Utc::now() + chrono::Duration::hours(1);
            let mut cached = self.cached_token.write().unwrap();
            *cached = Some((auth_response.access_token.clone(), expiry_time));
        }

        info!("Access token obtained");
        Ok(auth_response.access_token)
    }

    /// Asks Daraja to prompt `phone_number` for `amount` shillings. On
    /// acceptance the caller gets the checkout/merchant request ids to
    /// persist; the actual outcome arrives later on the callback URL.
    /// No automatic retry on any failure, the donor re-submits.
    pub async fn initiate_stk_push(
        &self,
        phone_number: &str,
        amount: f64,
        account_reference: Option<&str>,
        transaction_desc: Option<&str>,
    ) -> Result<StkPushResponse> {
        // Validate before any outbound call
        let whole_amount = validate_amount(amount)?;
        let formatted_phone = normalize_phone(phone_number)?;

        info!("STK push for {} - KSh {}", formatted_phone, whole_amount);

        let access_token = self.get_access_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = daraja_password(
            &self.config.mpesa_short_code,
            &self.config.mpesa_passkey,
            &timestamp,
        );

        let (_, stk_url) = self.config.get_mpesa_urls();

        let stk_request = StkPushRequest {
            business_short_code: self.config.mpesa_short_code.clone(),
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount: whole_amount.to_string(),
            party_a: formatted_phone.clone(),
            party_b: self.config.mpesa_short_code.clone(),
            phone_number: formatted_phone,
            callback_url: self.config.mpesa_callback_url.clone(),
            account_reference: account_reference.unwrap_or("Tumaini").to_string(),
            transaction_desc: transaction_desc.unwrap_or("Donation").to_string(),
        };

        let response = self
            .client
            .post(&stk_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&stk_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("STK push rejected: {} - {}", status, body);
            return Err(AppError::MpesaRejected(body));
        }

        let stk_response: StkPushResponse = response.json().await?;

        if stk_response.response_code != "0" {
            error!(
                "STK push declined: {} - {}",
                stk_response.response_code, stk_response.response_description
            );
            return Err(AppError::MpesaRejected(stk_response.response_description));
        }

        info!("STK push accepted: {}", stk_response.checkout_request_id);
        Ok(stk_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_local_leading_zero() {
        assert_eq!(normalize_phone("0712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("0112345678").unwrap(), "254112345678");
    }

    #[test]
    fn normalizes_international_forms() {
        assert_eq!(normalize_phone("254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("+254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone(" 712345678 ").unwrap(), "254712345678");
    }

    #[test]
    fn rejects_garbage_phone_numbers() {
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("07123456789").is_err());
        assert!(normalize_phone("25471234567x").is_err());
        assert!(normalize_phone("").is_err());
    }

    #[test]
    fn rejects_non_positive_and_fractional_amounts() {
        assert!(validate_amount(0.0).is_err());
        assert!(validate_amount(-5.0).is_err());
        assert!(validate_amount(10.5).is_err());
        assert!(validate_amount(f64::NAN).is_err());
        assert_eq!(validate_amount(500.0).unwrap(), 500);
    }

    #[test]
    fn password_is_base64_of_concatenation() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let password = daraja_password("174379", "passkey", "20240115103000");
        let decoded = STANDARD.decode(password).unwrap();
        assert_eq!(decoded, b"174379passkey20240115103000");
    }
}
