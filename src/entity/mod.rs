pub mod addresses;
pub mod audit_logs;
pub mod cart_items;
pub mod carts;
pub mod inventory;
pub mod inventory_history;
pub mod order_details;
pub mod order_items;
pub mod orders;
pub mod payment_transactions;
pub mod product_variants;
pub mod products;
pub mod sea_orm_active_enums;
pub mod users;
pub mod variant_combinations;
pub mod vendors;

pub use addresses::Entity as Addresses;
pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use inventory::Entity as Inventory;
pub use inventory_history::Entity as InventoryHistory;
pub use order_details::Entity as OrderDetails;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use payment_transactions::Entity as PaymentTransactions;
pub use product_variants::Entity as ProductVariants;
pub use products::Entity as Products;
pub use users::Entity as Users;
pub use variant_combinations::Entity as VariantCombinations;
pub use vendors::Entity as Vendors;
