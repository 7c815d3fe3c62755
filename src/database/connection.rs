use mongodb::{Client, Database};
use std::env;

pub async fn get_db_client() -> Database {
    let database_url = env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set as an environment variable");

    let client = Client::with_uri_str(&database_url)
        .await
        .expect("Failed to connect to MongoDB");

    let db_name = env::var("DATABASE_NAME").unwrap_or_else(|_| "tumainidb".to_string());
    let db = client.database(&db_name);

    match db.list_collection_names().await {
        Ok(collections) => {
            tracing::info!("Connected to database: {}", db_name);
            tracing::info!("Collections found: {:?}", collections);

            for required in ["donations", "mpesa_transactions"] {
                if !collections.contains(&required.to_string()) {
                    tracing::warn!("'{}' collection not found, it will be created on first insert", required);
                }
            }
        }
        Err(e) => {
            tracing::error!("Database '{}' may not exist or is inaccessible: {}", db_name, e);
        }
    }

    db
}
