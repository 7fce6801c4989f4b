use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    catalog::Catalog,
    error::{AppError, AppResult},
    models::{Cart, NewOrder, Order, OrderStatus, totals},
    store::OrderStore,
};

/// The order ledger: records paid-for carts exactly once per captured
/// transaction and moves orders forward through their lifecycle.
#[derive(Clone)]
pub struct OrderLedger {
    store: Arc<dyn OrderStore>,
    catalog: Arc<Catalog>,
}

impl OrderLedger {
    pub fn new(store: Arc<dyn OrderStore>, catalog: Arc<Catalog>) -> Self {
        Self { store, catalog }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Records a paid order for `cart`. A second call with the same
    /// transaction id returns the first order.
    pub async fn create_from_capture(
        &self,
        cart: &Cart,
        user_id: &str,
        payment_method: &str,
        transaction_id: &str,
    ) -> AppResult<Order> {
        self.record(NewOrder {
            user_id: user_id.to_string(),
            items: cart.items.clone(),
            status: OrderStatus::Paid,
            payment_method: payment_method.to_string(),
            payment_transaction_id: transaction_id.to_string(),
            external_order_id: None,
            customer_email: None,
        })
        .await
    }

    pub async fn record(&self, new: NewOrder) -> AppResult<Order> {
        if new.payment_transaction_id.trim().is_empty() {
            return Err(AppError::InvalidInput("transaction id is required".into()));
        }
        if let Some(existing) = self
            .store
            .find_by_transaction(&new.payment_transaction_id)
            .await?
        {
            tracing::info!(
                order_id = %existing.id,
                transaction_id = %new.payment_transaction_id,
                "duplicate capture, returning existing order"
            );
            return Ok(existing);
        }

        if new.items.is_empty() {
            return Err(AppError::EmptyCart);
        }
        for item in &new.items {
            let offered = self
                .catalog
                .get(&item.design_id)
                .is_some_and(|design| design.offers(&item.format));
            if !offered {
                return Err(AppError::InvalidInput(format!(
                    "design {} is not sold as {}",
                    item.design_id, item.format
                )));
            }
        }

        let now = Utc::now();
        let (total, _) = totals(&new.items);
        let order = Order {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            items: new.items,
            total,
            status: new.status,
            payment_method: new.payment_method,
            payment_transaction_id: Some(new.payment_transaction_id),
            external_order_id: new.external_order_id,
            customer_email: new.customer_email,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.insert_unique(order).await?;
        tracing::info!(
            order_id = %stored.id,
            transaction_id = ?stored.payment_transaction_id,
            status = %stored.status,
            total = %stored.total,
            "order recorded"
        );
        Ok(stored)
    }

    pub async fn get(&self, order_id: Uuid) -> AppResult<Order> {
        self.store.get(order_id).await?.ok_or(AppError::OrderNotFound)
    }

    pub async fn find_by_external_order(&self, external_order_id: &str) -> AppResult<Option<Order>> {
        self.store.find_by_external_order(external_order_id).await
    }

    /// Forward-only status change.
    pub async fn update_status(&self, order_id: Uuid, new_status: OrderStatus) -> AppResult<Order> {
        let order = self.get(order_id).await?;
        if !order.status.can_transition_to(new_status) {
            return Err(AppError::InvalidTransition {
                from: order.status,
                to: new_status,
            });
        }

        let now = Utc::now();
        if !self
            .store
            .update_status(order_id, order.status, new_status, now)
            .await?
        {
            // Someone else moved the order first.
            let current = self.get(order_id).await?;
            return Err(AppError::InvalidTransition {
                from: current.status,
                to: new_status,
            });
        }

        tracing::info!(
            order_id = %order_id,
            from = %order.status,
            to = %new_status,
            "order status updated"
        );
        Ok(Order {
            status: new_status,
            updated_at: now,
            ..order
        })
    }

    /// Orders for `user_id`, newest first.
    pub async fn get_user_orders(&self, user_id: &str) -> AppResult<Vec<Order>> {
        self.store.list_by_user(user_id).await
    }

    /// Cancels `pending` orders created before `now - max_age`.
    pub async fn cancel_stale_pending(
        &self,
        max_age: chrono::Duration,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>> {
        let stale = self.store.list_pending_before(now - max_age).await?;
        let mut cancelled = Vec::with_capacity(stale.len());
        for order in stale {
            match self.update_status(order.id, OrderStatus::Cancelled).await {
                Ok(_) => cancelled.push(order.id),
                Err(AppError::InvalidTransition { from, .. }) => {
                    tracing::debug!(order_id = %order.id, status = %from, "stale order moved on, skipping");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(cancelled)
    }
}
