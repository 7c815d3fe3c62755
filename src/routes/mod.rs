pub mod donations;
pub mod mpesa;
