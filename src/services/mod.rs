pub mod mpesa_service;
