pub mod auth_service;
pub mod cart_service;
pub mod checkout_service;
pub mod fulfillment_service;
pub mod order_service;
pub mod sweep;
