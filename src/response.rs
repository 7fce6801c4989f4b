use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Envelope metadata. `count` is only present on list payloads.
#[derive(Debug, Serialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub served_at: DateTime<Utc>,
}

impl Meta {
    pub fn empty() -> Self {
        Self {
            count: None,
            served_at: Utc::now(),
        }
    }

    pub fn count(count: usize) -> Self {
        Self {
            count: Some(count),
            ..Self::empty()
        }
    }
}

/// Every JSON body the API returns, errors included.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            meta,
        }
    }
}
