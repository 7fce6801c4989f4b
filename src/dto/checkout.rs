use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Cart, DownloadGrant, Order};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOrderResponse {
    pub external_order_id: String,
    pub status: String,
    /// Where the buyer approves the payment.
    pub approve_url: Option<String>,
    pub cart: Cart,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub external_order_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResponse {
    pub order: Order,
    pub grants: Vec<DownloadGrant>,
    /// Present when the payment went through but files could not be issued yet.
    pub fulfillment_error: Option<String>,
}
