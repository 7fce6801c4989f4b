mod common;

use axum::extract::State;
use lyric_storefront::routes::health::health_check;

#[tokio::test]
async fn health_check_returns_ok() {
    let app = common::test_app();
    let response = health_check(State(app.state.clone())).await;
    assert_eq!(response.0.message, "Health check");

    let data = response.0.data.expect("health data");
    assert_eq!(data.status, "ok");
    assert_eq!(data.designs, 2);
}
