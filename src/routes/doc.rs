use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{AccessToken, Credentials},
        cart::{AddToCartRequest, CartLineKey, SetQuantityRequest},
        catalog::{DesignList, DesignView, SessionIssued},
        checkout::{CaptureRequest, CaptureResponse, CheckoutOrderResponse},
        orders::{GrantList, OrderList, OrderWithGrants, UpdateOrderStatusRequest},
    },
    models::{Cart, CartLineItem, DownloadGrant, Order, OrderStatus, Shape, User},
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, catalog, checkout, downloads, health, orders, session},
    services::sweep::SweepReport,
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        session::issue_session,
        catalog::list_designs,
        catalog::get_design,
        cart::get_cart,
        cart::add_item,
        cart::set_item_quantity,
        cart::remove_item,
        cart::clear_cart,
        checkout::create_order,
        checkout::capture_order,
        orders::list_orders,
        orders::get_order,
        downloads::download,
        auth::register,
        auth::login,
        admin::get_order_admin,
        admin::update_order_status,
        admin::dispatch_order,
        admin::run_sweep
    ),
    components(
        schemas(
            User,
            Shape,
            DesignView,
            DesignList,
            SessionIssued,
            Cart,
            CartLineItem,
            Order,
            OrderStatus,
            DownloadGrant,
            AddToCartRequest,
            CartLineKey,
            SetQuantityRequest,
            CheckoutOrderResponse,
            CaptureRequest,
            CaptureResponse,
            OrderList,
            OrderWithGrants,
            GrantList,
            UpdateOrderStatusRequest,
            SweepReport,
            Credentials,
            AccessToken,
            Meta,
            ApiResponse<Cart>,
            ApiResponse<Order>,
            ApiResponse<OrderList>,
            ApiResponse<OrderWithGrants>,
            ApiResponse<CaptureResponse>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Session", description = "Session issuance"),
        (name = "Catalog", description = "Designs on sale"),
        (name = "Cart", description = "Session-scoped cart"),
        (name = "Checkout", description = "Payment order creation and capture"),
        (name = "Orders", description = "Order history"),
        (name = "Downloads", description = "Single-use download grants"),
        (name = "Auth", description = "Optional buyer accounts"),
        (name = "Admin", description = "Order administration"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
