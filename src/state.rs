use std::sync::Arc;

use mongodb::Database;

use crate::services::mpesa_service::MpesaService;

// The M-Pesa service is optional: with credentials missing the API still
// serves donation CRUD and health routes, and payment initiation returns 503.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub mpesa_service: Option<Arc<MpesaService>>,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        AppState {
            db,
            mpesa_service: None,
        }
    }

    pub fn with_mpesa(mut self, mpesa_service: Arc<MpesaService>) -> Self {
        self.mpesa_service = Some(mpesa_service);
        self
    }
}
