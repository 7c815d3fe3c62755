use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::donations;
use crate::state::AppState;

pub fn donation_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(donations::get_donations).post(donations::create_donation))
        .route("/:id", get(donations::get_donation))
}
