//! PayPal Orders v2 REST client.

use std::{
    str::FromStr,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    config::PayPalConfig,
    error::{AppError, AppResult},
    payment::{Capture, CaptureStatus, ExternalOrder, PaymentGateway, PurchaseUnit, money_value},
};

/// Tokens are refreshed this long before PayPal says they expire.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct PayPalClient {
    http: reqwest::Client,
    config: PayPalConfig,
    token: Mutex<Option<CachedToken>>,
}

impl PayPalClient {
    pub fn new(config: PayPalConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Gateway(e.to_string()))?;
        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn access_token(&self) -> AppResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.value.clone());
        }

        let response = self
            .http
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(gateway_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("token request failed: {status} {body}")));
        }
        let token: TokenResponse = response.json().await.map_err(gateway_error)?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_SLACK);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentGateway for PayPalClient {
    async fn create_order(&self, unit: &PurchaseUnit) -> AppResult<ExternalOrder> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.url("/v2/checkout/orders"))
            .bearer_auth(token)
            .header("PayPal-Request-Id", unit.correlation_id.to_string())
            .json(&CreateOrderRequest::from_unit(unit))
            .send()
            .await
            .map_err(gateway_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("create order failed: {status} {body}")));
        }
        let order: OrderResponse = response.json().await.map_err(gateway_error)?;
        let approve_url = order
            .links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.clone());

        Ok(ExternalOrder {
            id: order.id,
            status: order.status,
            approve_url,
        })
    }

    async fn capture_order(&self, external_order_id: &str) -> AppResult<Capture> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.url(&format!("/v2/checkout/orders/{external_order_id}/capture")))
            .bearer_auth(token)
            .header("PayPal-Request-Id", format!("capture-{external_order_id}"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await
            .map_err(gateway_error)?;

        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let error: ErrorResponse = response.json().await.unwrap_or_default();
            let issue = error
                .details
                .first()
                .map(|d| d.issue.clone())
                .unwrap_or(error.name);
            tracing::warn!(external_order_id, issue = %issue, "capture declined");
            return Err(AppError::CaptureFailed(issue));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("capture failed: {status} {body}")));
        }

        let order: OrderResponse = response.json().await.map_err(gateway_error)?;
        capture_from_response(order)
    }
}

fn gateway_error(err: reqwest::Error) -> AppError {
    AppError::Gateway(err.to_string())
}

/// Reads the first capture of the first purchase unit.
fn capture_from_response(order: OrderResponse) -> AppResult<Capture> {
    let payer_email = order.payer.and_then(|p| p.email_address);
    let capture = order
        .purchase_units
        .into_iter()
        .filter_map(|unit| unit.payments)
        .flat_map(|payments| payments.captures)
        .next();

    let Some(capture) = capture else {
        // No capture object means the processor refused before charging.
        return Ok(Capture {
            external_order_id: order.id,
            transaction_id: String::new(),
            amount: Decimal::ZERO,
            status: CaptureStatus::Denied,
            status_detail: order.status,
            payer_email,
        });
    };

    let amount = match capture.amount {
        Some(amount) => Decimal::from_str(&amount.value)
            .map_err(|e| AppError::Gateway(format!("invalid capture amount {}: {e}", amount.value)))?,
        None => Decimal::ZERO,
    };
    let status = match capture.status.as_str() {
        "COMPLETED" => CaptureStatus::Completed,
        "PENDING" => CaptureStatus::Pending,
        _ => CaptureStatus::Denied,
    };
    let status_detail = match capture.status_details.and_then(|d| d.reason) {
        Some(reason) => format!("{}: {reason}", capture.status),
        None => capture.status,
    };

    Ok(Capture {
        external_order_id: order.id,
        transaction_id: capture.id,
        amount,
        status,
        status_detail,
        payer_email,
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Serialize)]
struct Money {
    currency_code: String,
    value: String,
}

impl Money {
    fn new(currency: &str, amount: Decimal) -> Self {
        Self {
            currency_code: currency.to_string(),
            value: money_value(amount),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest {
    intent: &'static str,
    purchase_units: Vec<PurchaseUnitRequest>,
}

#[derive(Debug, Serialize)]
struct PurchaseUnitRequest {
    reference_id: String,
    custom_id: String,
    description: String,
    amount: AmountWithBreakdown,
    items: Vec<ItemRequest>,
}

#[derive(Debug, Serialize)]
struct AmountWithBreakdown {
    currency_code: String,
    value: String,
    breakdown: Breakdown,
}

#[derive(Debug, Serialize)]
struct Breakdown {
    item_total: Money,
}

#[derive(Debug, Serialize)]
struct ItemRequest {
    name: String,
    sku: String,
    unit_amount: Money,
    quantity: String,
    category: &'static str,
}

impl CreateOrderRequest {
    fn from_unit(unit: &PurchaseUnit) -> Self {
        let correlation = unit.correlation_id.to_string();
        Self {
            intent: "CAPTURE",
            purchase_units: vec![PurchaseUnitRequest {
                reference_id: correlation.clone(),
                custom_id: correlation,
                description: unit.description.clone(),
                amount: AmountWithBreakdown {
                    currency_code: unit.currency.clone(),
                    value: money_value(unit.total),
                    breakdown: Breakdown {
                        item_total: Money::new(&unit.currency, unit.total),
                    },
                },
                items: unit
                    .items
                    .iter()
                    .map(|item| ItemRequest {
                        name: item.name.clone(),
                        sku: item.sku.clone(),
                        unit_amount: Money::new(&unit.currency, item.unit_amount),
                        quantity: item.quantity.to_string(),
                        category: "DIGITAL_GOODS",
                    })
                    .collect(),
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<LinkResponse>,
    #[serde(default)]
    payer: Option<PayerResponse>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnitResponse>,
}

#[derive(Debug, Deserialize)]
struct LinkResponse {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct PayerResponse {
    email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnitResponse {
    #[serde(default)]
    payments: Option<PaymentsResponse>,
}

#[derive(Debug, Deserialize)]
struct PaymentsResponse {
    #[serde(default)]
    captures: Vec<CaptureResponse>,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    id: String,
    status: String,
    amount: Option<AmountResponse>,
    status_details: Option<StatusDetails>,
}

#[derive(Debug, Deserialize)]
struct AmountResponse {
    value: String,
}

#[derive(Debug, Deserialize)]
struct StatusDetails {
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    issue: String,
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use crate::payment::PurchaseItem;

    use super::*;

    fn parse(body: serde_json::Value) -> Capture {
        capture_from_response(serde_json::from_value(body).unwrap()).unwrap()
    }

    #[test]
    fn completed_capture_is_parsed() {
        let capture = parse(serde_json::json!({
            "id": "5O190127TN364715T",
            "status": "COMPLETED",
            "payer": { "email_address": "buyer@example.com" },
            "purchase_units": [{
                "payments": { "captures": [{
                    "id": "3C679366HH908993F",
                    "status": "COMPLETED",
                    "amount": { "currency_code": "USD", "value": "9.00" }
                }]}
            }]
        }));
        assert_eq!(capture.status, CaptureStatus::Completed);
        assert_eq!(capture.transaction_id, "3C679366HH908993F");
        assert_eq!(capture.amount, Decimal::new(900, 2));
        assert_eq!(capture.payer_email.as_deref(), Some("buyer@example.com"));
    }

    #[test]
    fn pending_capture_keeps_reason() {
        let capture = parse(serde_json::json!({
            "id": "O-1",
            "status": "COMPLETED",
            "purchase_units": [{
                "payments": { "captures": [{
                    "id": "T-1",
                    "status": "PENDING",
                    "amount": { "currency_code": "USD", "value": "3.00" },
                    "status_details": { "reason": "PENDING_REVIEW" }
                }]}
            }]
        }));
        assert_eq!(capture.status, CaptureStatus::Pending);
        assert_eq!(capture.status_detail, "PENDING: PENDING_REVIEW");
    }

    #[test]
    fn declined_or_missing_capture_is_denied() {
        let declined = parse(serde_json::json!({
            "id": "O-1",
            "status": "COMPLETED",
            "purchase_units": [{
                "payments": { "captures": [{ "id": "T-1", "status": "DECLINED" }] }
            }]
        }));
        assert_eq!(declined.status, CaptureStatus::Denied);

        let missing = parse(serde_json::json!({ "id": "O-2", "status": "DENIED" }));
        assert_eq!(missing.status, CaptureStatus::Denied);
        assert_eq!(missing.status_detail, "DENIED");
    }

    #[test]
    fn create_request_carries_breakdown_and_correlation() {
        let unit = PurchaseUnit {
            correlation_id: Uuid::nil(),
            description: "3 lyric design download(s)".into(),
            currency: "USD".into(),
            items: vec![PurchaseItem {
                name: "Toto - Africa (SVG)".into(),
                sku: "africa-SVG".into(),
                unit_amount: Decimal::new(3, 0),
                quantity: 3,
            }],
            total: Decimal::new(9, 0),
        };
        let body = serde_json::to_value(CreateOrderRequest::from_unit(&unit)).unwrap();
        let pu = &body["purchase_units"][0];
        assert_eq!(body["intent"], "CAPTURE");
        assert_eq!(pu["amount"]["value"], "9.00");
        assert_eq!(pu["amount"]["breakdown"]["item_total"]["value"], "9.00");
        assert_eq!(pu["items"][0]["unit_amount"]["value"], "3.00");
        assert_eq!(pu["items"][0]["quantity"], "3");
        assert_eq!(pu["custom_id"], Uuid::nil().to_string());
    }
}
