//! Storage seams. Services receive these as trait objects so the backing
//! store is a wiring decision: memory for tests, Postgres in production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{DownloadGrant, Order, OrderStatus, SessionData},
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryOrderStore, MemorySessionStore};
pub use postgres::{PgOrderStore, PgSessionStore};

/// Key-value session storage scoped by an opaque session id. Entries expire
/// after the store's TTL; saving refreshes it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> AppResult<Option<SessionData>>;

    async fn save(&self, session_id: &str, data: &SessionData) -> AppResult<()>;

    async fn destroy(&self, session_id: &str) -> AppResult<()>;

    /// Drops expired sessions, returning how many were removed.
    async fn purge_expired(&self) -> AppResult<u64>;
}

/// System of record for orders and their download grants. Every method
/// returns only after the write is durable.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts `order` unless one with the same payment transaction id
    /// exists, in which case the existing order is returned untouched.
    async fn insert_unique(&self, order: Order) -> AppResult<Order>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Order>>;

    async fn find_by_transaction(&self, transaction_id: &str) -> AppResult<Option<Order>>;

    async fn find_by_external_order(&self, external_order_id: &str) -> AppResult<Option<Order>>;

    /// Compare-and-set on status. Returns false when the order is no longer in `from`.
    async fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Orders for one user, newest first.
    async fn list_by_user(&self, user_id: &str) -> AppResult<Vec<Order>>;

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Order>>;

    async fn insert_grants(&self, grants: &[DownloadGrant]) -> AppResult<()>;

    async fn grants_for_order(&self, order_id: Uuid) -> AppResult<Vec<DownloadGrant>>;

    async fn get_grant(&self, id: Uuid) -> AppResult<Option<DownloadGrant>>;

    /// Moves the expiry of the order's unconsumed grants that have lapsed by
    /// `now` to `until`. Returns how many grants changed.
    async fn renew_lapsed_grants(
        &self,
        order_id: Uuid,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Marks the grant consumed if it is still redeemable at `now`.
    async fn consume_grant(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Option<DownloadGrant>>;
}
