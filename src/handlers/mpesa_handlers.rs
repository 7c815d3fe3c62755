// handlers/mpesa_handlers.rs
use axum::{
    extract::{Json, State},
    response::IntoResponse,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Collection, Database,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    errors::{AppError, Result},
    models::donation::Donation,
    models::mpesa_transactions::{
        encode_timestamp, CallbackData, MpesaTransaction, StkCallback, TransactionStatus,
        TransactionUpdate,
    },
    services::mpesa_service,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct StkPushApiRequest {
    #[serde(alias = "phone_number")]
    pub phone: String,
    pub amount: f64,
    #[serde(default, alias = "donationId")]
    pub donation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StkPushApiResponse {
    pub success: bool,
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub customer_message: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    pub checkout_request_id: String,
}

/// Initiates the push leg: validate, ask Daraja to prompt the phone, and on
/// acceptance record the pending ledger row that the callback will later
/// finalize.
pub async fn initiate_stk_push(
    State(state): State<AppState>,
    Json(request): Json<StkPushApiRequest>,
) -> Result<Json<StkPushApiResponse>> {
    info!(
        "STK push requested for donation {:?} - KSh {}",
        request.donation_id, request.amount
    );

    let service = state
        .mpesa_service
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("M-Pesa service is not configured".to_string()))?;

    // Reject bad input before any outbound call
    let normalized_phone = mpesa_service::normalize_phone(&request.phone)?;
    mpesa_service::validate_amount(request.amount)?;

    // A donation reference must point at a real pending donation
    if let Some(donation_id) = &request.donation_id {
        let object_id = ObjectId::parse_str(donation_id)?;
        let donations: Collection<Donation> = state.db.collection("donations");
        donations
            .find_one(doc! { "_id": object_id })
            .await?
            .ok_or(AppError::DonationNotFound)?;
    }

    let response = service
        .initiate_stk_push(
            &request.phone,
            request.amount,
            request.donation_id.as_deref(),
            Some("Donation"),
        )
        .await?;

    // Gateway accepted: persist the pending transaction so the callback can
    // correlate. This row is the only shared state between the two legs.
    let transactions: Collection<MpesaTransaction> = state.db.collection("mpesa_transactions");

    let transaction = MpesaTransaction {
        id: Some(ObjectId::new()),
        checkout_request_id: response.checkout_request_id.clone(),
        merchant_request_id: response.merchant_request_id.clone(),
        donation_id: request.donation_id.clone(),
        amount: request.amount,
        phone_number: normalized_phone,
        status: TransactionStatus::Pending,
        result_code: None,
        result_desc: None,
        mpesa_receipt_number: None,
        transaction_date: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    transactions.insert_one(&transaction).await?;

    info!(
        "Pending transaction recorded: {}",
        transaction.checkout_request_id
    );

    Ok(Json(StkPushApiResponse {
        success: true,
        checkout_request_id: response.checkout_request_id,
        merchant_request_id: response.merchant_request_id,
        customer_message: response.customer_message,
    }))
}

/// Receives Daraja's asynchronous result. Always acknowledges 200, whatever
/// the business outcome, so the provider never goes into a retry storm.
pub async fn mpesa_callback(
    State(state): State<AppState>,
    Json(payload): Json<CallbackData>,
) -> impl IntoResponse {
    let callback = payload.body.stk_callback;
    info!(
        "M-Pesa callback for {}: result {}",
        callback.checkout_request_id, callback.result_code
    );

    if let Err(e) = process_callback(&state.db, &callback).await {
        // The provider still gets its ack; the failure is ours to chase.
        error!(
            "Failed to process callback for {}: {}",
            callback.checkout_request_id, e
        );
    }

    Json(serde_json::json!({
        "ResultCode": 0,
        "ResultDesc": "Success"
    }))
}

async fn process_callback(db: &Database, callback: &StkCallback) -> Result<()> {
    let transactions: Collection<MpesaTransaction> = db.collection("mpesa_transactions");
    let update = TransactionUpdate::from_callback(callback);

    // Compare-and-swap on status: only a pending row may be finalized, so a
    // duplicate delivery of the same terminal callback is a no-op.
    let previous = transactions
        .find_one_and_update(
            TransactionUpdate::cas_filter(&callback.checkout_request_id),
            update.set_document(Utc::now()),
        )
        .await?;

    let transaction = match previous {
        Some(transaction) => transaction,
        None => {
            let existing = transactions
                .find_one(doc! { "checkout_request_id": &callback.checkout_request_id })
                .await?;

            match existing {
                Some(settled) => warn!(
                    "Duplicate callback for {} ignored (already {})",
                    callback.checkout_request_id,
                    settled.status.as_str()
                ),
                None => warn!(
                    "Unmatched callback for {}: no pending transaction on record",
                    callback.checkout_request_id
                ),
            }
            return Ok(());
        }
    };

    if update.status != TransactionStatus::Completed {
        info!(
            "Transaction {} failed: {} - {}",
            callback.checkout_request_id, update.result_code, update.result_desc
        );
        return Ok(());
    }

    let Some(donation_id) = transaction.donation_id.as_deref() else {
        return Ok(());
    };

    let Some(receipt) = update.mpesa_receipt_number.as_deref() else {
        // A donation may never complete without a settlement reference
        warn!(
            "Successful callback for {} carried no receipt number, donation {} left pending",
            callback.checkout_request_id, donation_id
        );
        return Ok(());
    };

    complete_donation(db, donation_id, receipt).await
}

/// Marks the linked donation settled. Conditional on the donation still being
/// pending, so replays and the status-poll read-repair can call this freely.
async fn complete_donation(db: &Database, donation_id: &str, receipt: &str) -> Result<()> {
    let object_id = ObjectId::parse_str(donation_id)?;
    let donations: Collection<Donation> = db.collection("donations");

    let result = donations
        .update_one(
            doc! { "_id": object_id, "status": "pending" },
            doc! {
                "$set": {
                    "status": "completed",
                    "transaction_id": receipt,
                    "updated_at": encode_timestamp(Utc::now()),
                }
            },
        )
        .await?;

    if result.modified_count > 0 {
        info!("Donation {} completed with receipt {}", donation_id, receipt);
    }

    Ok(())
}

/// Polling channel for the initiating session: the donor's browser only ever
/// saw "check your phone", so this is how it learns the terminal state.
pub async fn check_payment_status(
    State(state): State<AppState>,
    Json(request): Json<PaymentStatusRequest>,
) -> Result<Json<serde_json::Value>> {
    let transactions: Collection<MpesaTransaction> = state.db.collection("mpesa_transactions");

    let transaction = transactions
        .find_one(doc! { "checkout_request_id": &request.checkout_request_id })
        .await?
        .ok_or(AppError::TransactionNotFound)?;

    // Read-repair: if the callback settled the transaction but the donation
    // write was lost, heal it here rather than leaving the donation pending.
    if transaction.status == TransactionStatus::Completed {
        if let (Some(donation_id), Some(receipt)) = (
            transaction.donation_id.as_deref(),
            transaction.mpesa_receipt_number.as_deref(),
        ) {
            if let Err(e) = complete_donation(&state.db, donation_id, receipt).await {
                error!("Read-repair of donation {} failed: {}", donation_id, e);
            }
        }
    }

    Ok(Json(serde_json::json!({
        "checkout_request_id": transaction.checkout_request_id,
        "status": transaction.status,
        "result_code": transaction.result_code,
        "result_desc": transaction.result_desc,
        "mpesa_receipt_number": transaction.mpesa_receipt_number,
        "transaction_date": transaction.transaction_date,
        "donation_id": transaction.donation_id,
    })))
}

pub async fn get_transactions(
    State(state): State<AppState>,
) -> Result<Json<Vec<MpesaTransaction>>> {
    let transactions: Collection<MpesaTransaction> = state.db.collection("mpesa_transactions");

    let cursor = transactions.find(doc! {}).await?;
    let mut all: Vec<MpesaTransaction> = cursor.try_collect().await?;

    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(all))
}

pub async fn get_stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let transactions: Collection<MpesaTransaction> = state.db.collection("mpesa_transactions");

    let total = transactions.count_documents(doc! {}).await?;
    let pending = transactions
        .count_documents(doc! { "status": "pending" })
        .await?;
    let completed = transactions
        .count_documents(doc! { "status": "completed" })
        .await?;
    let failed = transactions
        .count_documents(doc! { "status": "failed" })
        .await?;

    Ok(Json(serde_json::json!({
        "total": total,
        "pending": pending,
        "completed": completed,
        "failed": failed,
    })))
}
