use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait, sea_query::{Expr, OnConflict},
};
use sqlx::types::Json;
use uuid::Uuid;

use crate::{
    audit::AuditEvent,
    db::{DbPool, OrmConn, orm_from_pool},
    entity::{
        download_grants::{
            ActiveModel as GrantActive, Column as GrantCol, Entity as DownloadGrants,
            Model as GrantModel,
        },
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
    },
    error::{AppError, AppResult},
    models::{CartLineItem, DownloadGrant, Order, OrderStatus, SessionData},
    store::{OrderStore, SessionStore},
};

/// Sessions kept as JSONB rows with an absolute expiry.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: DbPool,
    ttl: Duration,
}

impl PgSessionStore {
    pub fn new(pool: DbPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, session_id: &str) -> AppResult<Option<SessionData>> {
        let row: Option<(Json<SessionData>,)> =
            sqlx::query_as("SELECT data FROM sessions WHERE id = $1 AND expires_at > now()")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(data,)| data.0))
    }

    async fn save(&self, session_id: &str, data: &SessionData) -> AppResult<()> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("session ttl out of range: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO sessions (id, data, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(session_id)
        .bind(Json(data))
        .bind(Utc::now() + ttl)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Order ledger on Postgres. The unique index on `payment_transaction_id`
/// is what makes `insert_unique` safe across processes.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: DbPool,
    orm: OrmConn,
}

impl PgOrderStore {
    pub fn new(pool: DbPool) -> Self {
        let orm = orm_from_pool(&pool);
        Self { pool, orm }
    }

    async fn load_items(&self, order_ids: Vec<Uuid>) -> AppResult<HashMap<Uuid, Vec<CartLineItem>>> {
        let mut by_order: HashMap<Uuid, Vec<CartLineItem>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(by_order);
        }
        let rows = OrderItems::find()
            .filter(OrderItemCol::OrderId.is_in(order_ids))
            .order_by_asc(OrderItemCol::Position)
            .all(&self.orm)
            .await?;
        for row in rows {
            by_order
                .entry(row.order_id)
                .or_default()
                .push(line_from_entity(row)?);
        }
        Ok(by_order)
    }

    async fn hydrate(&self, models: Vec<OrderModel>) -> AppResult<Vec<Order>> {
        let mut items = self
            .load_items(models.iter().map(|m| m.id).collect())
            .await?;
        models
            .into_iter()
            .map(|model| {
                let lines = items.remove(&model.id).unwrap_or_default();
                order_from_entity(model, lines)
            })
            .collect()
    }

    async fn hydrate_one(&self, model: Option<OrderModel>) -> AppResult<Option<Order>> {
        match model {
            Some(model) => Ok(self.hydrate(vec![model]).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn audit(&self, user_id: Option<&str>, action: &str, metadata: serde_json::Value) {
        AuditEvent::new(action, "orders", metadata)
            .by(user_id)
            .record(&self.pool)
            .await;
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_unique(&self, order: Order) -> AppResult<Order> {
        let txn = self.orm.begin().await?;

        let inserted = Orders::insert(OrderActive {
            id: Set(order.id),
            user_id: Set(order.user_id.clone()),
            total: Set(order.total),
            status: Set(order.status.as_str().to_string()),
            payment_method: Set(order.payment_method.clone()),
            payment_transaction_id: Set(order.payment_transaction_id.clone()),
            external_order_id: Set(order.external_order_id.clone()),
            customer_email: Set(order.customer_email.clone()),
            created_at: Set(order.created_at.fixed_offset()),
            updated_at: Set(order.updated_at.fixed_offset()),
        })
        .on_conflict(
            OnConflict::column(OrderCol::PaymentTransactionId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

        if inserted == 0 {
            txn.rollback().await?;
            let txn_id = order.payment_transaction_id.as_deref().unwrap_or_default();
            tracing::info!(transaction_id = txn_id, "order already recorded for transaction");
            return self
                .find_by_transaction(txn_id)
                .await?
                .ok_or(AppError::OrderNotFound);
        }

        let lines = order
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| {
                Ok(OrderItemActive {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order.id),
                    position: Set(i32::try_from(position)
                        .map_err(|e| AppError::Internal(e.into()))?),
                    design_id: Set(item.design_id.clone()),
                    format: Set(item.format.clone()),
                    unit_price: Set(item.unit_price),
                    quantity: Set(i32::try_from(item.quantity)
                        .map_err(|e| AppError::Internal(e.into()))?),
                })
            })
            .collect::<AppResult<Vec<_>>>()?;
        if !lines.is_empty() {
            OrderItems::insert_many(lines).exec(&txn).await?;
        }

        txn.commit().await?;

        self.audit(
            Some(&order.user_id),
            "order_created",
            serde_json::json!({
                "order_id": order.id,
                "transaction_id": order.payment_transaction_id,
                "status": order.status,
                "total": order.total,
            }),
        )
        .await;

        Ok(order)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Order>> {
        let model = Orders::find_by_id(id).one(&self.orm).await?;
        self.hydrate_one(model).await
    }

    async fn find_by_transaction(&self, transaction_id: &str) -> AppResult<Option<Order>> {
        let model = Orders::find()
            .filter(OrderCol::PaymentTransactionId.eq(transaction_id))
            .one(&self.orm)
            .await?;
        self.hydrate_one(model).await
    }

    async fn find_by_external_order(&self, external_order_id: &str) -> AppResult<Option<Order>> {
        let model = Orders::find()
            .filter(OrderCol::ExternalOrderId.eq(external_order_id))
            .one(&self.orm)
            .await?;
        self.hydrate_one(model).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = Orders::update_many()
            .col_expr(OrderCol::Status, Expr::value(to.as_str()))
            .col_expr(OrderCol::UpdatedAt, Expr::value(at.fixed_offset()))
            .filter(OrderCol::Id.eq(id))
            .filter(OrderCol::Status.eq(from.as_str()))
            .exec(&self.orm)
            .await?;

        let updated = result.rows_affected == 1;
        if updated {
            self.audit(
                None,
                "order_status",
                serde_json::json!({ "order_id": id, "from": from, "to": to }),
            )
            .await;
        }
        Ok(updated)
    }

    async fn list_by_user(&self, user_id: &str) -> AppResult<Vec<Order>> {
        let models = Orders::find()
            .filter(OrderCol::UserId.eq(user_id))
            .order_by_desc(OrderCol::CreatedAt)
            .all(&self.orm)
            .await?;
        self.hydrate(models).await
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Order>> {
        let models = Orders::find()
            .filter(OrderCol::Status.eq(OrderStatus::Pending.as_str()))
            .filter(OrderCol::CreatedAt.lt(cutoff.fixed_offset()))
            .all(&self.orm)
            .await?;
        self.hydrate(models).await
    }

    async fn insert_grants(&self, grants: &[DownloadGrant]) -> AppResult<()> {
        let Some(first) = grants.first() else {
            return Ok(());
        };
        let rows = grants
            .iter()
            .enumerate()
            .map(|(position, grant)| {
                Ok(GrantActive {
                    id: Set(grant.id),
                    order_id: Set(grant.order_id),
                    position: Set(i32::try_from(position).map_err(|e| AppError::Internal(e.into()))?),
                    design_id: Set(grant.design_id.clone()),
                    format: Set(grant.format.clone()),
                    expires_at: Set(grant.expires_at.fixed_offset()),
                    consumed: Set(grant.consumed),
                    created_at: NotSet,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;
        DownloadGrants::insert_many(rows).exec(&self.orm).await?;

        self.audit(
            None,
            "grants_issued",
            serde_json::json!({ "order_id": first.order_id, "count": grants.len() }),
        )
        .await;
        Ok(())
    }

    async fn grants_for_order(&self, order_id: Uuid) -> AppResult<Vec<DownloadGrant>> {
        let rows = DownloadGrants::find()
            .filter(GrantCol::OrderId.eq(order_id))
            .order_by_asc(GrantCol::CreatedAt)
            .order_by_asc(GrantCol::Position)
            .all(&self.orm)
            .await?;
        Ok(rows.into_iter().map(grant_from_entity).collect())
    }

    async fn get_grant(&self, id: Uuid) -> AppResult<Option<DownloadGrant>> {
        let grant = DownloadGrants::find_by_id(id).one(&self.orm).await?;
        Ok(grant.map(grant_from_entity))
    }

    async fn renew_lapsed_grants(
        &self,
        order_id: Uuid,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = DownloadGrants::update_many()
            .col_expr(GrantCol::ExpiresAt, Expr::value(until.fixed_offset()))
            .filter(GrantCol::OrderId.eq(order_id))
            .filter(GrantCol::Consumed.eq(false))
            .filter(GrantCol::ExpiresAt.lte(now.fixed_offset()))
            .exec(&self.orm)
            .await?;
        if result.rows_affected > 0 {
            self.audit(
                None,
                "grants_renewed",
                serde_json::json!({ "order_id": order_id, "count": result.rows_affected }),
            )
            .await;
        }
        Ok(result.rows_affected)
    }

    async fn consume_grant(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Option<DownloadGrant>> {
        let result = DownloadGrants::update_many()
            .col_expr(GrantCol::Consumed, Expr::value(true))
            .filter(GrantCol::Id.eq(id))
            .filter(GrantCol::Consumed.eq(false))
            .filter(GrantCol::ExpiresAt.gt(now.fixed_offset()))
            .exec(&self.orm)
            .await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.get_grant(id).await
    }
}

fn order_from_entity(model: OrderModel, items: Vec<CartLineItem>) -> AppResult<Order> {
    let status = model
        .status
        .parse::<OrderStatus>()
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        items,
        total: model.total,
        status,
        payment_method: model.payment_method,
        payment_transaction_id: model.payment_transaction_id,
        external_order_id: model.external_order_id,
        customer_email: model.customer_email,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn line_from_entity(model: OrderItemModel) -> AppResult<CartLineItem> {
    Ok(CartLineItem {
        design_id: model.design_id,
        format: model.format,
        unit_price: model.unit_price,
        quantity: u32::try_from(model.quantity).map_err(|e| AppError::Internal(e.into()))?,
    })
}

fn grant_from_entity(model: GrantModel) -> DownloadGrant {
    DownloadGrant {
        id: model.id,
        design_id: model.design_id,
        format: model.format,
        order_id: model.order_id,
        expires_at: model.expires_at.with_timezone(&Utc),
        consumed: model.consumed,
    }
}
