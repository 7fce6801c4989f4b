use std::sync::Arc;

use secrecy::SecretString;

use crate::{
    catalog::Catalog,
    config::AppConfig,
    db::DbPool,
    payment::{PaymentAdapter, PaymentGateway},
    services::{
        cart_service::CartService,
        checkout_service::CheckoutService,
        fulfillment_service::{AssetStore, DeliveryService, FulfillmentDispatcher},
        order_service::OrderLedger,
        sweep::Sweeper,
    },
    store::{OrderStore, SessionStore},
};

/// The swappable backends behind the services.
pub struct Collaborators {
    pub sessions: Arc<dyn SessionStore>,
    pub orders: Arc<dyn OrderStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub assets: Arc<dyn AssetStore>,
    pub delivery: Arc<dyn DeliveryService>,
}

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub catalog: Arc<Catalog>,
    pub carts: CartService,
    pub ledger: OrderLedger,
    pub dispatcher: FulfillmentDispatcher,
    pub checkout: CheckoutService,
    pub sweeper: Sweeper,
    pub jwt_secret: Option<SecretString>,
    pub session_ttl_secs: u64,
}

impl AppState {
    pub fn new(pool: DbPool, catalog: Arc<Catalog>, deps: Collaborators, config: &AppConfig) -> Self {
        let carts = CartService::new(deps.sessions.clone());
        let ledger = OrderLedger::new(deps.orders, catalog.clone());
        let dispatcher = FulfillmentDispatcher::new(
            ledger.clone(),
            catalog.clone(),
            deps.assets,
            deps.delivery,
            config.download_ttl,
            &config.public_base_url,
        );
        let payments = PaymentAdapter::new(deps.gateway, catalog.clone(), config.currency.clone());
        let checkout = CheckoutService::new(
            carts.clone(),
            payments,
            ledger.clone(),
            dispatcher.clone(),
        );
        let sweeper = Sweeper::new(ledger.clone(), deps.sessions, config.pending_order_ttl);

        Self {
            pool,
            catalog,
            carts,
            ledger,
            dispatcher,
            checkout,
            sweeper,
            jwt_secret: config.jwt_secret.clone(),
            session_ttl_secs: config.session_ttl.as_secs(),
        }
    }
}
