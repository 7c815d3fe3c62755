pub mod donation;
pub mod mpesa_transactions;
