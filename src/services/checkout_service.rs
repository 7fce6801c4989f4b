use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    models::{Cart, DownloadGrant, GUEST_USER, NewOrder, Order, OrderStatus, PendingCheckout},
    payment::{CaptureStatus, ExternalOrder, PaymentAdapter},
    services::{
        cart_service::CartService, fulfillment_service::FulfillmentDispatcher,
        order_service::OrderLedger,
    },
};

pub const PAYMENT_METHOD: &str = "paypal";

/// What the client needs to send the buyer to the processor.
#[derive(Debug, Clone)]
pub struct CheckoutStarted {
    pub external_order: ExternalOrder,
    pub cart: Cart,
}

#[derive(Debug, Clone)]
pub struct CheckoutResult {
    pub order: Order,
    pub grants: Vec<DownloadGrant>,
    /// Set when the order is paid but fulfillment has to be retried.
    pub fulfillment_error: Option<String>,
}

/// Cart → processor order → capture → ledger → fulfillment.
#[derive(Clone)]
pub struct CheckoutService {
    carts: CartService,
    payments: PaymentAdapter,
    ledger: OrderLedger,
    dispatcher: FulfillmentDispatcher,
}

impl CheckoutService {
    pub fn new(
        carts: CartService,
        payments: PaymentAdapter,
        ledger: OrderLedger,
        dispatcher: FulfillmentDispatcher,
    ) -> Self {
        Self {
            carts,
            payments,
            ledger,
            dispatcher,
        }
    }

    /// Creates the processor order from the current cart and remembers the
    /// snapshot that was sent, so capture charges for exactly that.
    pub async fn begin(&self, session_id: &str) -> AppResult<CheckoutStarted> {
        if session_id.is_empty() {
            return Err(AppError::SessionRequired);
        }
        let cart = self.carts.get(session_id).await?;
        if cart.is_empty() {
            return Err(AppError::EmptyCart);
        }

        let (external_order, unit) = self.payments.create_order(&cart).await?;
        let pending = PendingCheckout {
            external_order_id: external_order.id.clone(),
            correlation_id: unit.correlation_id,
            items: cart.items.clone(),
            total: cart.total,
            created_at: Utc::now(),
        };
        self.carts
            .update(session_id, move |data| {
                data.checkout = Some(pending);
                Ok(())
            })
            .await?;

        tracing::info!(
            session_id,
            external_order_id = %external_order.id,
            correlation_id = %unit.correlation_id,
            total = %cart.total,
            "checkout started"
        );
        Ok(CheckoutStarted {
            external_order,
            cart,
        })
    }

    /// Captures the processor order and records it. Capturing an order the
    /// ledger already holds returns it without touching the processor, but
    /// only to the session or account that placed it.
    pub async fn capture(
        &self,
        session_id: &str,
        user_id: &str,
        external_order_id: &str,
    ) -> AppResult<CheckoutResult> {
        let external_order_id = external_order_id.trim();
        if external_order_id.is_empty() {
            return Err(AppError::InvalidInput("externalOrderId is required".into()));
        }

        if let Some(order) = self.ledger.find_by_external_order(external_order_id).await? {
            return self.repeat_capture(session_id, user_id, order).await;
        }

        if session_id.is_empty() {
            return Err(AppError::SessionRequired);
        }
        let snapshot = match self.carts.session(session_id).await?.checkout {
            Some(checkout) if checkout.external_order_id == external_order_id => checkout,
            _ => {
                return Err(AppError::BadRequest(
                    "no checkout in progress for this order".into(),
                ));
            }
        };

        let capture = self.payments.capture(external_order_id).await?;
        let new_order = |status| NewOrder {
            user_id: user_id.to_string(),
            items: snapshot.items.clone(),
            status,
            payment_method: PAYMENT_METHOD.to_string(),
            payment_transaction_id: capture.transaction_id.clone(),
            external_order_id: Some(external_order_id.to_string()),
            customer_email: capture.payer_email.clone(),
        };

        if capture.status == CaptureStatus::Pending {
            let order = self.ledger.record(new_order(OrderStatus::Pending)).await?;
            tracing::warn!(
                order_id = %order.id,
                transaction_id = %capture.transaction_id,
                external_order_id,
                detail = %capture.status_detail,
                "capture pending, cart kept"
            );
        }
        let capture = capture.clone().require_completed().inspect_err(|err| {
            tracing::warn!(session_id, external_order_id, error = %err, "capture not completed, cart kept");
        })?;

        if capture.amount != snapshot.total {
            tracing::error!(
                transaction_id = %capture.transaction_id,
                external_order_id,
                captured = %capture.amount,
                expected = %snapshot.total,
                "captured amount differs from checkout total"
            );
        }

        let order = self.ledger.record(new_order(OrderStatus::Paid)).await?;
        tracing::info!(
            order_id = %order.id,
            transaction_id = %capture.transaction_id,
            external_order_id,
            session_id,
            "payment captured"
        );

        // The purchase stands even when fulfillment does not.
        let (order, grants, fulfillment_error) = match self.dispatcher.dispatch(&order).await {
            Ok(grants) => (self.ledger.get(order.id).await?, grants, None),
            Err(err) => {
                tracing::error!(order_id = %order.id, error = %err, "fulfillment failed, retry required");
                (order, Vec::new(), Some(err.to_string()))
            }
        };

        self.carts
            .update(session_id, |data| {
                data.items.clear();
                data.checkout = None;
                data.remember_capture(external_order_id);
                Ok(())
            })
            .await?;

        Ok(CheckoutResult {
            order,
            grants,
            fulfillment_error,
        })
    }

    async fn repeat_capture(
        &self,
        session_id: &str,
        user_id: &str,
        order: Order,
    ) -> AppResult<CheckoutResult> {
        let by_account = user_id != GUEST_USER && order.user_id == user_id;
        let by_session = match (session_id.is_empty(), order.external_order_id.as_deref()) {
            (false, Some(external_order_id)) => self
                .carts
                .session(session_id)
                .await?
                .started_checkout(external_order_id),
            _ => false,
        };
        if !by_account && !by_session {
            tracing::warn!(
                order_id = %order.id,
                session_id,
                "repeated capture from a caller that did not place the order"
            );
            return Err(AppError::OrderNotFound);
        }

        tracing::info!(order_id = %order.id, "capture repeated for a recorded order");
        if order.status == OrderStatus::Pending {
            return Err(AppError::CapturePending(
                "waiting for the processor to settle the payment".into(),
            ));
        }
        let grants = self.ledger.store().grants_for_order(order.id).await?;
        Ok(CheckoutResult {
            order,
            grants,
            fulfillment_error: None,
        })
    }
}
