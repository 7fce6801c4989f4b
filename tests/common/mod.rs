#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use lyric_storefront::{
    catalog::Catalog,
    config::{AppConfig, PayPalConfig},
    error::AppResult,
    payment::{Capture, CaptureStatus, ExternalOrder, PaymentGateway, PurchaseUnit},
    services::fulfillment_service::{FsAssetStore, LinkDelivery},
    state::{AppState, Collaborators},
    store::{MemoryOrderStore, MemorySessionStore},
};
use rust_decimal::Decimal;
use secrecy::SecretString;
use tempfile::TempDir;

pub const CATALOG: &str = r#"{
  "designs": [
    {
      "id": "x",
      "artist": "Queen",
      "song": "Bohemian Rhapsody",
      "shape": "GUITAR",
      "price": "3.00",
      "formats": ["SVG", "PDF"],
      "assetPaths": { "SVG": "x/design.svg", "PDF": "x/design.pdf" }
    },
    {
      "id": "y",
      "artist": "John Lennon",
      "song": "Imagine",
      "shape": "PIANO",
      "price": "3.00",
      "formats": ["PNG"],
      "assetPaths": { "PNG": "y/design.png" }
    }
  ]
}"#;

/// Stand-in for the payment processor. Captures report `status` and the
/// amount of the order that was created.
pub struct FakeGateway {
    status: Mutex<CaptureStatus>,
    totals: Mutex<HashMap<String, Decimal>>,
    pub created: AtomicUsize,
    pub captured: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(CaptureStatus::Completed),
            totals: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
            captured: AtomicUsize::new(0),
        }
    }

    pub fn set_status(&self, status: CaptureStatus) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, unit: &PurchaseUnit) -> AppResult<ExternalOrder> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("EXT-{n}");
        self.totals.lock().unwrap().insert(id.clone(), unit.total);
        Ok(ExternalOrder {
            id,
            status: "CREATED".into(),
            approve_url: Some(format!("https://paypal.test/checkoutnow?token=EXT-{n}")),
        })
    }

    async fn capture_order(&self, external_order_id: &str) -> AppResult<Capture> {
        self.captured.fetch_add(1, Ordering::SeqCst);
        let status = *self.status.lock().unwrap();
        let amount = self
            .totals
            .lock()
            .unwrap()
            .get(external_order_id)
            .copied()
            .unwrap_or_default();
        let detail = match status {
            CaptureStatus::Completed => "COMPLETED",
            CaptureStatus::Pending => "PENDING: PENDING_REVIEW",
            CaptureStatus::Denied => "DENIED",
        };
        Ok(Capture {
            external_order_id: external_order_id.to_string(),
            transaction_id: format!("TXN-{external_order_id}"),
            amount,
            status,
            status_detail: detail.into(),
            payer_email: Some("buyer@example.com".into()),
        })
    }
}

pub struct TestApp {
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub orders: Arc<MemoryOrderStore>,
    pub assets: TempDir,
}

impl TestApp {
    pub fn asset(&self, relative: &str) -> std::path::PathBuf {
        self.assets.path().join(relative)
    }
}

pub fn config(asset_root: &std::path::Path) -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/unused".into(),
        host: "127.0.0.1".into(),
        port: 3000,
        public_base_url: "http://shop.test".into(),
        catalog_path: "data/catalog.json".into(),
        asset_root: asset_root.to_path_buf(),
        currency: "USD".into(),
        paypal: PayPalConfig {
            base_url: "http://paypal.invalid".into(),
            client_id: "client".into(),
            client_secret: SecretString::from("secret".to_string()),
        },
        session_ttl: Duration::from_secs(3600),
        download_ttl: chrono::Duration::hours(72),
        pending_order_ttl: chrono::Duration::hours(24),
        sweep_interval: Duration::from_secs(3600),
        jwt_secret: Some(SecretString::from("test-secret".to_string())),
    }
}

/// Memory-backed app with every catalog asset present on disk.
pub fn test_app() -> TestApp {
    let assets = tempfile::tempdir().unwrap();
    for file in ["x/design.svg", "x/design.pdf", "y/design.png"] {
        let path = assets.path().join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("bytes of {file}")).unwrap();
    }

    let config = config(assets.path());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();
    let catalog = Arc::new(Catalog::from_json(CATALOG).unwrap());
    let gateway = Arc::new(FakeGateway::new());
    let orders = Arc::new(MemoryOrderStore::new());

    let deps = Collaborators {
        sessions: Arc::new(MemorySessionStore::new(config.session_ttl)),
        orders: orders.clone(),
        gateway: gateway.clone(),
        assets: Arc::new(FsAssetStore::new(assets.path())),
        delivery: Arc::new(LinkDelivery),
    };

    TestApp {
        state: AppState::new(pool, catalog, deps, &config),
        gateway,
        orders,
        assets,
    }
}
