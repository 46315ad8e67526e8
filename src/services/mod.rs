pub mod admin_service;
pub mod cart_service;
pub mod order_service;
pub mod order_state;
pub mod payment_service;
pub mod pricing;
pub mod stock_ledger;
