use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

/// One row of the reconciliation trail kept alongside the ledger.
#[derive(Debug, Clone)]
pub struct AuditEvent<'a> {
    pub actor: Option<&'a str>,
    pub action: &'a str,
    pub resource: &'a str,
    pub detail: Value,
}

impl<'a> AuditEvent<'a> {
    pub fn new(action: &'a str, resource: &'a str, detail: Value) -> Self {
        Self {
            actor: None,
            action,
            resource,
            detail,
        }
    }

    pub fn by(mut self, actor: Option<&'a str>) -> Self {
        self.actor = actor;
        self
    }

    pub async fn write(&self, pool: &DbPool) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO audit_logs (id, user_id, action, resource, metadata) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(self.actor)
        .bind(self.action)
        .bind(self.resource)
        .bind(&self.detail)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Writes the event; a failure is logged and never reaches the caller.
    pub async fn record(self, pool: &DbPool) {
        if let Err(err) = self.write(pool).await {
            tracing::warn!(error = %err, action = self.action, "audit write failed");
        }
    }
}
