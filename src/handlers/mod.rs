pub(crate) mod donations;
pub(crate) mod mpesa_handlers;
