//! Payment processor seam. `PaymentGateway` is the raw processor API;
//! `PaymentAdapter` turns carts into processor orders and processor capture
//! outcomes into results the checkout flow can act on.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    catalog::Catalog,
    error::{AppError, AppResult},
    models::{Cart, is_money},
};

pub mod paypal;

pub use paypal::PayPalClient;

/// Processor item names longer than this are truncated.
const MAX_ITEM_NAME_CHARS: usize = 127;

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseItem {
    pub name: String,
    pub sku: String,
    pub unit_amount: Decimal,
    pub quantity: u32,
}

/// Processor-side description of what is being bought.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseUnit {
    pub correlation_id: Uuid,
    pub description: String,
    pub currency: String,
    pub items: Vec<PurchaseItem>,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalOrder {
    pub id: String,
    pub status: String,
    pub approve_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Completed,
    Pending,
    Denied,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub external_order_id: String,
    pub transaction_id: String,
    pub amount: Decimal,
    pub status: CaptureStatus,
    /// Processor status string, kept for support and logs.
    pub status_detail: String,
    pub payer_email: Option<String>,
}

impl Capture {
    /// Only a completed capture counts as payment.
    pub fn require_completed(self) -> AppResult<Capture> {
        match self.status {
            CaptureStatus::Completed => Ok(self),
            CaptureStatus::Pending => Err(AppError::CapturePending(self.status_detail)),
            CaptureStatus::Denied => Err(AppError::CaptureFailed(self.status_detail)),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, unit: &PurchaseUnit) -> AppResult<ExternalOrder>;

    /// Captures a previously approved order. Capturing the same id twice is
    /// idempotent on the processor side.
    async fn capture_order(&self, external_order_id: &str) -> AppResult<Capture>;
}

#[derive(Clone)]
pub struct PaymentAdapter {
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<Catalog>,
    currency: String,
}

impl PaymentAdapter {
    pub fn new(gateway: Arc<dyn PaymentGateway>, catalog: Arc<Catalog>, currency: impl Into<String>) -> Self {
        Self {
            gateway,
            catalog,
            currency: currency.into(),
        }
    }

    /// Builds the processor line items for `cart`. The breakdown must add up
    /// to the cart total exactly.
    pub fn purchase_unit(&self, cart: &Cart, correlation_id: Uuid) -> AppResult<PurchaseUnit> {
        if cart.is_empty() {
            return Err(AppError::EmptyCart);
        }

        let items: Vec<PurchaseItem> = cart
            .items
            .iter()
            .map(|line| {
                if !is_money(line.unit_price) {
                    return Err(AppError::InvalidInput(format!(
                        "line {} ({}) has an invalid price",
                        line.design_id, line.format
                    )));
                }
                let name = match self.catalog.get(&line.design_id) {
                    Some(design) => design.display_name(&line.format),
                    None => format!("Lyric design ({})", line.format),
                };
                Ok(PurchaseItem {
                    name: name.chars().take(MAX_ITEM_NAME_CHARS).collect(),
                    sku: format!("{}-{}", line.design_id, line.format),
                    unit_amount: line.unit_price,
                    quantity: line.quantity,
                })
            })
            .collect::<AppResult<_>>()?;

        let item_total: Decimal = items
            .iter()
            .map(|i| i.unit_amount * Decimal::from(i.quantity))
            .sum();
        if item_total != cart.total {
            return Err(AppError::Internal(anyhow::anyhow!(
                "line items sum to {item_total} but cart total is {}",
                cart.total
            )));
        }

        Ok(PurchaseUnit {
            correlation_id,
            description: format!("{} lyric design download(s)", cart.item_count),
            currency: self.currency.clone(),
            items,
            total: item_total,
        })
    }

    /// Creates the external order. An empty cart never reaches the processor.
    pub async fn create_order(&self, cart: &Cart) -> AppResult<(ExternalOrder, PurchaseUnit)> {
        let unit = self.purchase_unit(cart, Uuid::new_v4())?;
        let order = self.gateway.create_order(&unit).await?;
        tracing::info!(
            external_order_id = %order.id,
            correlation_id = %unit.correlation_id,
            total = %unit.total,
            "external order created"
        );
        Ok((order, unit))
    }

    /// Raw capture outcome, whatever the processor decided. Callers settle it
    /// with [`Capture::require_completed`].
    pub async fn capture(&self, external_order_id: &str) -> AppResult<Capture> {
        let capture = self.gateway.capture_order(external_order_id).await?;
        tracing::info!(
            external_order_id,
            transaction_id = %capture.transaction_id,
            amount = %capture.amount,
            status = %capture.status_detail,
            "capture result"
        );
        Ok(capture)
    }
}

/// Decimal amount as the processor expects it: two fraction digits.
pub fn money_value(amount: Decimal) -> String {
    let mut amount = amount;
    amount.rescale(2);
    amount.to_string()
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use crate::models::{CartLineItem, Design, Shape};

    use super::*;

    fn catalog() -> Arc<Catalog> {
        let design = Design {
            id: "x".into(),
            artist: "Queen".into(),
            song: "Bohemian Rhapsody".into(),
            shape: Shape::Guitar,
            price: Decimal::new(300, 2),
            formats: ["SVG".to_string(), "PNG".to_string()].into(),
            asset_paths: Default::default(),
        };
        Arc::new(Catalog::from_designs(vec![design]).unwrap())
    }

    fn cart() -> Cart {
        Cart::from_items(
            "s",
            vec![
                CartLineItem {
                    design_id: "x".into(),
                    format: "SVG".into(),
                    unit_price: Decimal::new(300, 2),
                    quantity: 1,
                },
                CartLineItem {
                    design_id: "y".into(),
                    format: "PNG".into(),
                    unit_price: Decimal::new(333, 2),
                    quantity: 3,
                },
            ],
        )
    }

    fn capture(status: CaptureStatus, detail: &str) -> Capture {
        Capture {
            external_order_id: "EXT-1".into(),
            transaction_id: "TXN-1".into(),
            amount: Decimal::new(1299, 2),
            status,
            status_detail: detail.into(),
            payer_email: None,
        }
    }

    #[test]
    fn purchase_unit_breakdown_matches_cart_total_to_the_cent() {
        let adapter = PaymentAdapter::new(Arc::new(MockPaymentGateway::new()), catalog(), "USD");
        let unit = adapter.purchase_unit(&cart(), Uuid::new_v4()).unwrap();

        assert_eq!(unit.total, Decimal::new(1299, 2));
        assert_eq!(money_value(unit.total), "12.99");
        assert_eq!(unit.items[0].name, "Queen - Bohemian Rhapsody (SVG)");
        assert_eq!(unit.items[1].name, "Lyric design (PNG)");
        assert_eq!(unit.items[1].quantity, 3);
    }

    #[tokio::test]
    async fn empty_cart_never_reaches_the_gateway() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_order().never();
        let adapter = PaymentAdapter::new(Arc::new(gateway), catalog(), "USD");

        let err = adapter.create_order(&Cart::from_items("s", vec![])).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyCart));
    }

    #[tokio::test]
    async fn only_completed_captures_count_as_payment() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_capture_order()
            .with(eq("EXT-1"))
            .times(3)
            .returning({
                let mut outcomes = vec![
                    capture(CaptureStatus::Completed, "COMPLETED"),
                    capture(CaptureStatus::Pending, "PENDING"),
                    capture(CaptureStatus::Denied, "DENIED"),
                ]
                .into_iter();
                move |_| Ok(outcomes.next().unwrap())
            });
        let adapter = PaymentAdapter::new(Arc::new(gateway), catalog(), "USD");

        let settle = |capture: Capture| capture.require_completed();
        assert!(settle(adapter.capture("EXT-1").await.unwrap()).is_ok());
        assert!(matches!(
            settle(adapter.capture("EXT-1").await.unwrap()),
            Err(AppError::CapturePending(_))
        ));
        assert!(matches!(
            settle(adapter.capture("EXT-1").await.unwrap()),
            Err(AppError::CaptureFailed(detail)) if detail == "DENIED"
        ));
    }

    #[test]
    fn money_value_always_has_two_fraction_digits() {
        assert_eq!(money_value(Decimal::new(3, 0)), "3.00");
        assert_eq!(money_value(Decimal::new(45, 1)), "4.50");
        assert_eq!(money_value(Decimal::new(900, 2)), "9.00");
    }
}
