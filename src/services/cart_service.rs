use std::sync::Arc;

use rust_decimal::Decimal;

use crate::{
    error::{AppError, AppResult},
    keyed_lock::KeyedLock,
    models::{Cart, CartLineItem, SessionData, is_money},
    store::SessionStore,
};

pub const MAX_DESIGN_ID_LEN: usize = 128;
pub const MAX_FORMAT_LEN: usize = 16;
pub const MAX_QUANTITY: i64 = 100;

/// Session-scoped cart. Every mutation for one session id runs under that
/// session's lock as load, mutate, save, so concurrent requests cannot drop
/// each other's writes. Different sessions never contend.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn SessionStore>,
    locks: KeyedLock,
}

impl CartService {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            locks: KeyedLock::new(),
        }
    }

    /// Returns the session's cart, empty when nothing was stored yet.
    pub async fn get(&self, session_id: &str) -> AppResult<Cart> {
        let data = self.session(session_id).await?;
        Ok(Cart::from_items(session_id, data.items))
    }

    pub async fn session(&self, session_id: &str) -> AppResult<SessionData> {
        Ok(self.store.load(session_id).await?.unwrap_or_default())
    }

    pub async fn add(
        &self,
        session_id: &str,
        design_id: &str,
        format: &str,
        unit_price: Decimal,
        quantity: i64,
    ) -> AppResult<Cart> {
        let design_id = validate_design_id(design_id)?;
        let format = validate_format(format)?;
        let quantity = validate_quantity(quantity)?;
        if !is_money(unit_price) {
            return Err(AppError::InvalidInput(format!(
                "unit price {unit_price} is not a valid amount"
            )));
        }

        self.update_cart(session_id, |items| {
            match items.iter_mut().find(|i| i.matches(&design_id, &format)) {
                Some(line) => {
                    let merged = i64::from(line.quantity) + i64::from(quantity);
                    line.quantity = validate_quantity(merged)?;
                    line.unit_price = unit_price;
                }
                None => items.push(CartLineItem {
                    design_id: design_id.clone(),
                    format: format.clone(),
                    unit_price,
                    quantity,
                }),
            }
            Ok(())
        })
        .await
    }

    /// Removing a line that is not in the cart is a no-op.
    pub async fn remove(&self, session_id: &str, design_id: &str, format: &str) -> AppResult<Cart> {
        let (design_id, format) = canonical_key(design_id, format);
        self.update_cart(session_id, |items| {
            items.retain(|i| !i.matches(&design_id, &format));
            Ok(())
        })
        .await
    }

    /// `quantity <= 0` removes the line; an absent line is left absent.
    pub async fn set_quantity(
        &self,
        session_id: &str,
        design_id: &str,
        format: &str,
        quantity: i64,
    ) -> AppResult<Cart> {
        if quantity <= 0 {
            return self.remove(session_id, design_id, format).await;
        }
        let quantity = validate_quantity(quantity)?;
        let (design_id, format) = canonical_key(design_id, format);
        self.update_cart(session_id, |items| {
            if let Some(line) = items.iter_mut().find(|i| i.matches(&design_id, &format)) {
                line.quantity = quantity;
            }
            Ok(())
        })
        .await
    }

    pub async fn clear(&self, session_id: &str) -> AppResult<()> {
        self.update(session_id, |data| {
            data.items.clear();
            data.checkout = None;
            Ok(())
        })
        .await
    }

    /// Serialized read-modify-write of the whole session record. Nothing is
    /// written when `mutate` fails.
    pub async fn update<T, F>(&self, session_id: &str, mutate: F) -> AppResult<T>
    where
        F: FnOnce(&mut SessionData) -> AppResult<T>,
    {
        if session_id.is_empty() {
            return Err(AppError::SessionRequired);
        }
        let _guard = self.locks.lock(session_id).await;
        let mut data = self.store.load(session_id).await?.unwrap_or_default();
        let out = mutate(&mut data)?;
        self.store.save(session_id, &data).await?;
        Ok(out)
    }

    async fn update_cart<F>(&self, session_id: &str, mutate: F) -> AppResult<Cart>
    where
        F: FnOnce(&mut Vec<CartLineItem>) -> AppResult<()>,
    {
        let items = self
            .update(session_id, |data| {
                mutate(&mut data.items)?;
                Ok(data.items.clone())
            })
            .await?;
        let cart = Cart::from_items(session_id, items);
        tracing::debug!(
            session_id,
            lines = cart.items.len(),
            item_count = cart.item_count,
            total = %cart.total,
            "cart updated"
        );
        Ok(cart)
    }
}

fn canonical_key(design_id: &str, format: &str) -> (String, String) {
    (design_id.trim().to_string(), format.trim().to_ascii_uppercase())
}

fn validate_design_id(design_id: &str) -> AppResult<String> {
    let design_id = design_id.trim();
    if design_id.is_empty() {
        return Err(AppError::InvalidInput("designId is required".into()));
    }
    if design_id.len() > MAX_DESIGN_ID_LEN {
        return Err(AppError::InvalidInput(format!(
            "designId must be at most {MAX_DESIGN_ID_LEN} characters"
        )));
    }
    Ok(design_id.to_string())
}

fn validate_format(format: &str) -> AppResult<String> {
    let format = format.trim();
    if format.is_empty() || format.len() > MAX_FORMAT_LEN {
        return Err(AppError::InvalidInput("format is invalid".into()));
    }
    Ok(format.to_ascii_uppercase())
}

fn validate_quantity(quantity: i64) -> AppResult<u32> {
    if !(1..=MAX_QUANTITY).contains(&quantity) {
        return Err(AppError::InvalidInput(format!(
            "quantity must be between 1 and {MAX_QUANTITY}"
        )));
    }
    u32::try_from(quantity).map_err(|_| AppError::InvalidInput("quantity is invalid".into()))
}
