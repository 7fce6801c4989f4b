pub mod download_grants;
pub mod order_items;
pub mod orders;

pub use download_grants::Entity as DownloadGrants;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
