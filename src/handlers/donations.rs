// handlers/donations.rs
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Collection,
};

use crate::{
    errors::{AppError, Result},
    models::donation::{CreateDonation, Donation, DonationQuery, DonationStatus},
    state::AppState,
};

// Create a new donation pledge (always starts out pending)
pub async fn create_donation(
    State(state): State<AppState>,
    Json(payload): Json<CreateDonation>,
) -> Result<Json<Donation>> {
    if payload.amount <= 0.0 {
        return Err(AppError::invalid_data("Donation amount must be greater than 0"));
    }

    if !payload.is_anonymous && payload.donor_name.as_deref().map_or(true, |n| n.trim().is_empty()) {
        return Err(AppError::invalid_data(
            "Donor name is required unless the donation is anonymous",
        ));
    }

    let collection: Collection<Donation> = state.db.collection("donations");

    let donation = Donation {
        id: Some(ObjectId::new()),
        amount: payload.amount,
        currency: payload.currency.unwrap_or_else(|| "KES".to_string()),
        donor_name: if payload.is_anonymous { None } else { payload.donor_name },
        donor_email: if payload.is_anonymous { None } else { payload.donor_email },
        donor_phone: if payload.is_anonymous { None } else { payload.donor_phone },
        payment_method: payload.payment_method,
        status: DonationStatus::Pending,
        transaction_id: None,
        is_anonymous: payload.is_anonymous,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    collection.insert_one(&donation).await?;

    tracing::info!(
        "Created donation {} - {} {}",
        donation.id.map(|id| id.to_hex()).unwrap_or_default(),
        donation.amount,
        donation.currency
    );
    Ok(Json(donation))
}

// List donations with optional status / payment method filtering
pub async fn get_donations(
    State(state): State<AppState>,
    Query(query): Query<DonationQuery>,
) -> Result<Json<Vec<Donation>>> {
    let collection: Collection<Donation> = state.db.collection("donations");

    let mut filter = doc! {};

    if let Some(status) = &query.status {
        filter.insert("status", status);
    }

    if let Some(payment_method) = &query.payment_method {
        filter.insert("payment_method", payment_method);
    }

    let cursor = collection.find(filter).await?;
    let mut donations: Vec<Donation> = cursor.try_collect().await?;

    donations.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(donations))
}

// Fetch a single donation, used by donors polling for settlement
pub async fn get_donation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Donation>> {
    let object_id = ObjectId::parse_str(&id)?;

    let collection: Collection<Donation> = state.db.collection("donations");

    let donation = collection
        .find_one(doc! { "_id": object_id })
        .await?
        .ok_or(AppError::DonationNotFound)?;

    Ok(Json(donation))
}
