use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{DownloadGrant, Order, OrderStatus};

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithGrants {
    pub order: Order,
    pub grants: Vec<DownloadGrant>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GrantList {
    pub items: Vec<DownloadGrant>,
}
