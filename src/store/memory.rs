use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{DownloadGrant, Order, OrderStatus, SessionData},
    store::{OrderStore, SessionStore},
};

#[derive(Debug)]
pub struct MemorySessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, (SessionData, Instant)>>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(7 * 24 * 60 * 60))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> AppResult<Option<SessionData>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(data, _)| data.clone()))
    }

    async fn save(&self, session_id: &str, data: &SessionData) -> AppResult<()> {
        let expires_at = Instant::now() + self.ttl;
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), (data.clone(), expires_at));
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> AppResult<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn purge_expired(&self) -> AppResult<u64> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

#[derive(Debug, Default)]
struct Ledger {
    orders: HashMap<Uuid, Order>,
    grants: Vec<DownloadGrant>,
}

/// In-process order store used by tests and local tooling.
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    inner: RwLock<Ledger>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.inner.read().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert_unique(&self, order: Order) -> AppResult<Order> {
        let mut ledger = self.inner.write().await;
        if let Some(txn) = order.payment_transaction_id.as_deref() {
            if let Some(existing) = ledger
                .orders
                .values()
                .find(|o| o.payment_transaction_id.as_deref() == Some(txn))
            {
                return Ok(existing.clone());
            }
        }
        ledger.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn find_by_transaction(&self, transaction_id: &str) -> AppResult<Option<Order>> {
        Ok(self
            .inner
            .read()
            .await
            .orders
            .values()
            .find(|o| o.payment_transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn find_by_external_order(&self, external_order_id: &str) -> AppResult<Option<Order>> {
        Ok(self
            .inner
            .read()
            .await
            .orders
            .values()
            .find(|o| o.external_order_id.as_deref() == Some(external_order_id))
            .cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut ledger = self.inner.write().await;
        match ledger.orders.get_mut(&id) {
            Some(order) if order.status == from => {
                order.status = to;
                order.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_by_user(&self, user_id: &str) -> AppResult<Vec<Order>> {
        let ledger = self.inner.read().await;
        let mut orders: Vec<Order> = ledger
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Order>> {
        let ledger = self.inner.read().await;
        Ok(ledger
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn insert_grants(&self, grants: &[DownloadGrant]) -> AppResult<()> {
        self.inner.write().await.grants.extend_from_slice(grants);
        Ok(())
    }

    async fn grants_for_order(&self, order_id: Uuid) -> AppResult<Vec<DownloadGrant>> {
        let ledger = self.inner.read().await;
        Ok(ledger
            .grants
            .iter()
            .filter(|g| g.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn get_grant(&self, id: Uuid) -> AppResult<Option<DownloadGrant>> {
        let ledger = self.inner.read().await;
        Ok(ledger.grants.iter().find(|g| g.id == id).cloned())
    }

    async fn renew_lapsed_grants(
        &self,
        order_id: Uuid,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut ledger = self.inner.write().await;
        let mut renewed = 0;
        for grant in ledger
            .grants
            .iter_mut()
            .filter(|g| g.order_id == order_id && !g.consumed && g.expires_at <= now)
        {
            grant.expires_at = until;
            renewed += 1;
        }
        Ok(renewed)
    }

    async fn consume_grant(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Option<DownloadGrant>> {
        let mut ledger = self.inner.write().await;
        let grant = ledger
            .grants
            .iter_mut()
            .find(|g| g.id == id && g.is_redeemable(now));
        Ok(grant.map(|g| {
            g.consumed = true;
            g.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_sessions_are_invisible_and_purged() {
        let store = MemorySessionStore::new(Duration::ZERO);
        store.save("s1", &SessionData::default()).await.unwrap();
        assert!(store.load("s1").await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn destroy_removes_session() {
        let store = MemorySessionStore::default();
        store.save("s1", &SessionData::default()).await.unwrap();
        assert!(store.load("s1").await.unwrap().is_some());
        store.destroy("s1").await.unwrap();
        assert!(store.load("s1").await.unwrap().is_none());
    }
}
