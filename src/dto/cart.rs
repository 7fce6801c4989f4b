use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub design_id: String,
    pub format: String,
    /// Informational; the catalog price is charged.
    pub price: Option<Decimal>,
    pub quantity: Option<i64>,
}

/// Identifies one cart line by its (design, format) key.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLineKey {
    pub design_id: String,
    pub format: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetQuantityRequest {
    pub design_id: String,
    pub format: String,
    pub quantity: i64,
}
