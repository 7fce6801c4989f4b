//! Turns paid orders into download grants and hands them to delivery.

use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    catalog::Catalog,
    error::{AppError, AppResult},
    keyed_lock::KeyedLock,
    models::{DownloadGrant, Order, OrderStatus},
    services::order_service::OrderLedger,
};

/// Resolves catalog asset paths to file contents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn exists(&self, relative_path: &str) -> AppResult<bool>;

    /// `None` when the file is not there.
    async fn read(&self, relative_path: &str) -> AppResult<Option<Vec<u8>>>;
}

/// Assets on local disk under one root directory.
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Only plain relative paths resolve; `..`, roots and prefixes never do.
    fn resolve(&self, relative_path: &str) -> Option<PathBuf> {
        let path = Path::new(relative_path);
        let plain = path.components().next().is_some()
            && path.components().all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            tracing::warn!(path = relative_path, "asset path escapes the asset root");
            return None;
        }
        Some(self.root.join(path))
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn exists(&self, relative_path: &str) -> AppResult<bool> {
        let Some(path) = self.resolve(relative_path) else {
            return Ok(false);
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("stat {}", path.display()))
                .into()),
        }
    }

    async fn read(&self, relative_path: &str) -> AppResult<Option<Vec<u8>>> {
        let Some(path) = self.resolve(relative_path) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("read {}", path.display()))
                .into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRequest {
    pub grant_id: Uuid,
    pub design_id: String,
    pub format: String,
    pub recipient: String,
    pub download_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub grant_id: Uuid,
    pub delivered: bool,
    pub detail: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered(grant_id: Uuid) -> Self {
        Self {
            grant_id,
            delivered: true,
            detail: None,
        }
    }

    pub fn failed(grant_id: Uuid, detail: impl Into<String>) -> Self {
        Self {
            grant_id,
            delivered: false,
            detail: Some(detail.into()),
        }
    }
}

/// Gets purchased files to the buyer. Reports success or failure per item.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryService: Send + Sync {
    async fn deliver(&self, requests: &[DeliveryRequest]) -> AppResult<Vec<DeliveryOutcome>>;
}

/// Publishes each download link to the log, where the mailer picks it up.
#[derive(Debug, Clone, Default)]
pub struct LinkDelivery;

#[async_trait]
impl DeliveryService for LinkDelivery {
    async fn deliver(&self, requests: &[DeliveryRequest]) -> AppResult<Vec<DeliveryOutcome>> {
        Ok(requests
            .iter()
            .map(|req| {
                tracing::info!(
                    grant_id = %req.grant_id,
                    recipient = %req.recipient,
                    design_id = %req.design_id,
                    format = %req.format,
                    url = %req.download_url,
                    expires_at = %req.expires_at,
                    "download link issued"
                );
                DeliveryOutcome::delivered(req.grant_id)
            })
            .collect())
    }
}

/// A redeemed grant and the file it unlocks.
#[derive(Debug, Clone)]
pub struct Download {
    pub grant: DownloadGrant,
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct FulfillmentDispatcher {
    ledger: OrderLedger,
    catalog: Arc<Catalog>,
    assets: Arc<dyn AssetStore>,
    delivery: Arc<dyn DeliveryService>,
    download_ttl: chrono::Duration,
    link_base: String,
    locks: KeyedLock,
}

impl FulfillmentDispatcher {
    pub fn new(
        ledger: OrderLedger,
        catalog: Arc<Catalog>,
        assets: Arc<dyn AssetStore>,
        delivery: Arc<dyn DeliveryService>,
        download_ttl: chrono::Duration,
        public_base_url: &str,
    ) -> Self {
        Self {
            ledger,
            catalog,
            assets,
            delivery,
            download_ttl,
            link_base: format!("{}/api/downloads", public_base_url.trim_end_matches('/')),
            locks: KeyedLock::new(),
        }
    }

    /// Issues one grant per purchased unit, delivers them and marks the
    /// order fulfilled. A fulfilled order returns its existing grants.
    /// Any failure leaves the order `paid` so the call can be retried.
    pub async fn dispatch(&self, order: &Order) -> AppResult<Vec<DownloadGrant>> {
        self.dispatch_at(order, Utc::now()).await
    }

    /// [`dispatch`](Self::dispatch) as of `now`. Grants from an earlier
    /// attempt that lapsed unused get a fresh download window.
    pub async fn dispatch_at(&self, order: &Order, now: DateTime<Utc>) -> AppResult<Vec<DownloadGrant>> {
        let _guard = self.locks.lock(&order.id.to_string()).await;
        let order = self.ledger.get(order.id).await?;
        let store = self.ledger.store();

        match order.status {
            OrderStatus::Paid => {}
            OrderStatus::Fulfilled => {
                tracing::debug!(order_id = %order.id, "order already fulfilled");
                return store.grants_for_order(order.id).await;
            }
            other => return Err(AppError::NotPayable(other)),
        }

        self.check_assets(&order).await?;

        let mut grants = store.grants_for_order(order.id).await?;
        if grants.is_empty() {
            grants = self.new_grants(&order, now);
            store.insert_grants(&grants).await?;
            tracing::info!(order_id = %order.id, grants = grants.len(), "download grants issued");
        } else if grants.iter().any(|g| !g.consumed && g.expires_at <= now) {
            let renewed = store
                .renew_lapsed_grants(order.id, now, now + self.download_ttl)
                .await?;
            tracing::info!(order_id = %order.id, renewed, "lapsed download grants renewed");
            grants = store.grants_for_order(order.id).await?;
        }

        let recipient = order
            .customer_email
            .clone()
            .unwrap_or_else(|| order.user_id.clone());
        let requests: Vec<DeliveryRequest> = grants
            .iter()
            .map(|grant| DeliveryRequest {
                grant_id: grant.id,
                design_id: grant.design_id.clone(),
                format: grant.format.clone(),
                recipient: recipient.clone(),
                download_url: format!("{}/{}", self.link_base, grant.id),
                expires_at: grant.expires_at,
            })
            .collect();

        let outcomes = self.delivery.deliver(&requests).await?;
        let failures: Vec<String> = requests
            .iter()
            .filter(|req| {
                !outcomes
                    .iter()
                    .any(|out| out.grant_id == req.grant_id && out.delivered)
            })
            .map(|req| {
                let detail = outcomes
                    .iter()
                    .find(|out| out.grant_id == req.grant_id)
                    .and_then(|out| out.detail.clone())
                    .unwrap_or_else(|| "no delivery outcome".to_string());
                format!("{} {} ({}): {detail}", req.grant_id, req.design_id, req.format)
            })
            .collect();
        if !failures.is_empty() {
            tracing::error!(order_id = %order.id, failures = ?failures, "delivery failed, order stays paid");
            return Err(AppError::DeliveryFailed(failures.join("; ")));
        }

        self.ledger
            .update_status(order.id, OrderStatus::Fulfilled)
            .await?;
        tracing::info!(order_id = %order.id, "order fulfilled");
        Ok(grants)
    }

    /// Every purchased (design, format) must have a file on disk. Each gap
    /// is logged; the first is returned.
    async fn check_assets(&self, order: &Order) -> AppResult<()> {
        let mut first_missing = None;
        for item in &order.items {
            let present = match self.catalog.asset_path(&item.design_id, &item.format) {
                Some(path) => self.assets.exists(path).await?,
                None => false,
            };
            if !present {
                tracing::error!(
                    order_id = %order.id,
                    design_id = %item.design_id,
                    format = %item.format,
                    "asset missing for paid order"
                );
                first_missing.get_or_insert_with(|| AppError::AssetMissing {
                    design_id: item.design_id.clone(),
                    format: item.format.clone(),
                });
            }
        }
        match first_missing {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn new_grants(&self, order: &Order, now: DateTime<Utc>) -> Vec<DownloadGrant> {
        let expires_at = now + self.download_ttl;
        order
            .items
            .iter()
            .flat_map(|item| {
                (0..item.quantity).map(move |_| DownloadGrant {
                    id: Uuid::new_v4(),
                    design_id: item.design_id.clone(),
                    format: item.format.clone(),
                    order_id: order.id,
                    expires_at,
                    consumed: false,
                })
            })
            .collect()
    }

    /// Consumes a grant and returns the file it unlocks. The grant is only
    /// spent once the file has been read.
    pub async fn redeem(&self, grant_id: Uuid, now: DateTime<Utc>) -> AppResult<Download> {
        let store = self.ledger.store();
        let grant = store.get_grant(grant_id).await?.ok_or(AppError::NotFound)?;
        if !grant.is_redeemable(now) {
            return Err(AppError::GrantUnavailable);
        }
        let order = self.ledger.get(grant.order_id).await?;
        if !matches!(order.status, OrderStatus::Paid | OrderStatus::Fulfilled) {
            return Err(AppError::GrantUnavailable);
        }

        let missing = || AppError::AssetMissing {
            design_id: grant.design_id.clone(),
            format: grant.format.clone(),
        };
        let path = self
            .catalog
            .asset_path(&grant.design_id, &grant.format)
            .ok_or_else(missing)?;
        let bytes = self.assets.read(path).await?.ok_or_else(|| {
            tracing::error!(grant_id = %grant.id, path, "asset vanished before download");
            missing()
        })?;
        let file_name = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("download")
            .to_string();

        let grant = store
            .consume_grant(grant_id, now)
            .await?
            .ok_or(AppError::GrantUnavailable)?;
        tracing::info!(grant_id = %grant.id, order_id = %grant.order_id, "grant redeemed");

        Ok(Download {
            content_type: content_type(&grant.format),
            grant,
            file_name,
            bytes,
        })
    }
}

pub fn content_type(format: &str) -> &'static str {
    match format {
        "SVG" => "image/svg+xml",
        "PNG" => "image/png",
        "JPG" | "JPEG" => "image/jpeg",
        "PDF" => "application/pdf",
        _ => "application/octet-stream",
    }
}
