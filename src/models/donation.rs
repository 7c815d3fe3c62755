// models/donation.rs
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Mpesa,
    Bank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::Completed => "completed",
            DonationStatus::Failed => "failed",
            DonationStatus::Refunded => "refunded",
        }
    }

    /// Allowed lifecycle: pending -> {completed, failed};
    /// completed -> refunded is the only post-settlement move.
    pub fn can_transition_to(&self, next: DonationStatus) -> bool {
        matches!(
            (self, next),
            (DonationStatus::Pending, DonationStatus::Completed)
                | (DonationStatus::Pending, DonationStatus::Failed)
                | (DonationStatus::Completed, DonationStatus::Refunded)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub amount: f64,
    pub currency: String,

    // Donor details are null for anonymous gifts
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub donor_phone: Option<String>,

    pub payment_method: PaymentMethod,
    pub status: DonationStatus,

    // Receipt number from the payment rail, set only when settled
    pub transaction_id: Option<String>,
    pub is_anonymous: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDonation {
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub donor_phone: Option<String>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Deserialize)]
pub struct DonationQuery {
    pub status: Option<String>,
    pub payment_method: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_settles_to_completed_or_failed() {
        assert!(DonationStatus::Pending.can_transition_to(DonationStatus::Completed));
        assert!(DonationStatus::Pending.can_transition_to(DonationStatus::Failed));
        assert!(!DonationStatus::Pending.can_transition_to(DonationStatus::Refunded));
    }

    #[test]
    fn only_completed_can_be_refunded() {
        assert!(DonationStatus::Completed.can_transition_to(DonationStatus::Refunded));
        assert!(!DonationStatus::Failed.can_transition_to(DonationStatus::Refunded));
        assert!(!DonationStatus::Refunded.can_transition_to(DonationStatus::Refunded));
    }

    #[test]
    fn terminal_states_never_reopen() {
        for terminal in [DonationStatus::Completed, DonationStatus::Failed, DonationStatus::Refunded] {
            assert!(!terminal.can_transition_to(DonationStatus::Pending));
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DonationStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentMethod::Mpesa).unwrap(),
            "\"mpesa\""
        );
    }
}
