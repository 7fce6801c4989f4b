use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    models::OrderStatus,
    response::{ApiResponse, Meta},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Session required")]
    SessionRequired,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Payment not completed: {0}")]
    CaptureFailed(String),

    #[error("Payment is pending: {0}")]
    CapturePending(String),

    #[error("Order not found")]
    OrderNotFound,

    #[error("Invalid order transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order is {0}, only paid orders can be fulfilled")]
    NotPayable(OrderStatus),

    #[error("Download is no longer available")]
    GrantUnavailable,

    #[error("Asset missing for design {design_id} ({format})")]
    AssetMissing { design_id: String, format: String },

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound | AppError::OrderNotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::InvalidInput(_) | AppError::EmptyCart => {
                StatusCode::BAD_REQUEST
            }
            AppError::SessionRequired | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::CaptureFailed(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::CapturePending(_) => StatusCode::ACCEPTED,
            AppError::InvalidTransition { .. } | AppError::NotPayable(_) => StatusCode::CONFLICT,
            AppError::GrantUnavailable => StatusCode::GONE,
            AppError::DeliveryFailed(_) | AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::AssetMissing { .. }
            | AppError::DbError(_)
            | AppError::OrmError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let message = self.to_string();
        let body = ApiResponse {
            message: message.clone(),
            data: Some(ErrorData { error: message }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
