// models/mpesa_transactions.rs
use chrono::{DateTime, SecondsFormat, Utc};
use mongodb::bson::{doc, oid::ObjectId, Document};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

/// One STK push attempt. Created when Daraja accepts the push request,
/// finalized at most once by the callback receiver. The checkout request id
/// is the correlation key between the two legs of the flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpesaTransaction {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub checkout_request_id: String,
    pub merchant_request_id: String,

    // Donation being paid for, if the donor created one before pushing
    pub donation_id: Option<String>,

    pub amount: f64,
    pub phone_number: String,

    pub status: TransactionStatus,
    pub result_code: Option<i32>,
    pub result_desc: Option<String>,
    pub mpesa_receipt_number: Option<String>,
    pub transaction_date: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---- Daraja callback envelope ----

#[derive(Debug, Deserialize)]
pub struct CallbackData {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,

    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,

    #[serde(rename = "ResultCode")]
    pub result_code: i32,

    #[serde(rename = "ResultDesc")]
    pub result_desc: String,

    // Present only on success
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item")]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,

    // Daraja mixes strings and numbers here (receipt is a string, the
    // transaction date and phone arrive as numbers)
    #[serde(rename = "Value", default)]
    pub value: serde_json::Value,
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    fn metadata_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)
            .map(|item| &item.value)
    }

    pub fn receipt_number(&self) -> Option<String> {
        self.metadata_value("MpesaReceiptNumber")
            .and_then(|v| v.as_str().map(|s| s.to_string()))
    }

    pub fn transaction_date(&self) -> Option<String> {
        self.metadata_value("TransactionDate").map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// The write the callback receiver should apply to the ledger row.
/// Pure so the result-code mapping and metadata extraction are testable
/// without a database.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionUpdate {
    pub status: TransactionStatus,
    pub result_code: i32,
    pub result_desc: String,
    pub mpesa_receipt_number: Option<String>,
    pub transaction_date: Option<String>,
}

impl TransactionUpdate {
    /// Filter for the finalization write. Pinning `status` to pending makes
    /// the update a compare-and-swap: a replayed terminal callback matches
    /// no row and therefore writes nothing.
    pub fn cas_filter(checkout_request_id: &str) -> Document {
        doc! {
            "checkout_request_id": checkout_request_id,
            "status": TransactionStatus::Pending.as_str(),
        }
    }

    /// The `$set` document applying this finalization. `updated_at` uses the
    /// same RFC 3339 encoding chrono's serde emits on insert, so the field
    /// has one representation across the collection.
    pub fn set_document(&self, updated_at: DateTime<Utc>) -> Document {
        doc! {
            "$set": {
                "status": self.status.as_str(),
                "result_code": self.result_code,
                "result_desc": &self.result_desc,
                "mpesa_receipt_number": self.mpesa_receipt_number.clone(),
                "transaction_date": self.transaction_date.clone(),
                "updated_at": encode_timestamp(updated_at),
            }
        }
    }

    pub fn from_callback(callback: &StkCallback) -> Self {
        if callback.is_success() {
            TransactionUpdate {
                status: TransactionStatus::Completed,
                result_code: callback.result_code,
                result_desc: callback.result_desc.clone(),
                mpesa_receipt_number: callback.receipt_number(),
                transaction_date: callback.transaction_date(),
            }
        } else {
            TransactionUpdate {
                status: TransactionStatus::Failed,
                result_code: callback.result_code,
                result_desc: callback.result_desc.clone(),
                mpesa_receipt_number: None,
                transaction_date: None,
            }
        }
    }
}

/// Matches the string form chrono's serde produces for `DateTime<Utc>`
/// fields, which is what typed-collection inserts store.
pub fn encode_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success_callback() -> StkCallback {
        StkCallback {
            merchant_request_id: "mr_1".to_string(),
            checkout_request_id: "ws_abc123".to_string(),
            result_code: 0,
            result_desc: "The service request is processed successfully.".to_string(),
            callback_metadata: Some(CallbackMetadata {
                items: vec![
                    MetadataItem {
                        name: "Amount".to_string(),
                        value: serde_json::json!(500.0),
                    },
                    MetadataItem {
                        name: "MpesaReceiptNumber".to_string(),
                        value: serde_json::json!("QA12345"),
                    },
                    MetadataItem {
                        name: "TransactionDate".to_string(),
                        value: serde_json::json!(20240115103000u64),
                    },
                ],
            }),
        }
    }

    #[test]
    fn success_extracts_receipt_and_date() {
        let update = TransactionUpdate::from_callback(&success_callback());
        assert_eq!(update.status, TransactionStatus::Completed);
        assert_eq!(update.mpesa_receipt_number.as_deref(), Some("QA12345"));
        assert_eq!(update.transaction_date.as_deref(), Some("20240115103000"));
    }

    #[test]
    fn failure_carries_no_receipt() {
        let callback = StkCallback {
            merchant_request_id: "mr_2".to_string(),
            checkout_request_id: "ws_def456".to_string(),
            result_code: 1032,
            result_desc: "Request cancelled by user".to_string(),
            callback_metadata: None,
        };

        let update = TransactionUpdate::from_callback(&callback);
        assert_eq!(update.status, TransactionStatus::Failed);
        assert_eq!(update.result_code, 1032);
        assert!(update.mpesa_receipt_number.is_none());
        assert!(update.transaction_date.is_none());
    }

    #[test]
    fn success_without_metadata_still_completes() {
        let callback = StkCallback {
            callback_metadata: None,
            ..success_callback()
        };

        let update = TransactionUpdate::from_callback(&callback);
        assert_eq!(update.status, TransactionStatus::Completed);
        assert!(update.mpesa_receipt_number.is_none());
    }

    #[test]
    fn metadata_lookup_is_name_keyed() {
        let callback = success_callback();
        assert!(callback.metadata_value("NoSuchField").is_none());
        assert_eq!(
            callback.metadata_value("Amount"),
            Some(&serde_json::json!(500.0))
        );
    }
}
