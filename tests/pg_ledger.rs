use std::time::Duration;

use chrono::Utc;
use lyric_storefront::{
    db::{create_pool, run_migrations},
    models::{CartLineItem, DownloadGrant, Order, OrderStatus, SessionData},
    store::{OrderStore, PgOrderStore, PgSessionStore, SessionStore},
};
use rust_decimal::Decimal;
use uuid::Uuid;

fn database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
}

fn order(transaction_id: &str) -> Order {
    let now = Utc::now();
    Order {
        id: Uuid::new_v4(),
        user_id: "guest".into(),
        items: vec![
            CartLineItem {
                design_id: "x".into(),
                format: "SVG".into(),
                unit_price: Decimal::new(300, 2),
                quantity: 1,
            },
            CartLineItem {
                design_id: "y".into(),
                format: "PNG".into(),
                unit_price: Decimal::new(300, 2),
                quantity: 2,
            },
        ],
        total: Decimal::new(900, 2),
        status: OrderStatus::Paid,
        payment_method: "paypal".into(),
        payment_transaction_id: Some(transaction_id.into()),
        external_order_id: Some(format!("EXT-{transaction_id}")),
        customer_email: None,
        created_at: now,
        updated_at: now,
    }
}

// Ledger against a real database: one order per transaction, forward-only
// status, single-use grants.
#[tokio::test]
async fn pg_order_store_enforces_ledger_guarantees() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run Postgres ledger tests.");
        return Ok(());
    };
    let pool = create_pool(&database_url).await?;
    run_migrations(&pool).await?;
    let store = PgOrderStore::new(pool);

    let txn = format!("TXN-{}", Uuid::new_v4());
    let first = store.insert_unique(order(&txn)).await?;
    let second = store.insert_unique(order(&txn)).await?;
    assert_eq!(first.id, second.id);

    let loaded = store.get(first.id).await?.expect("order stored");
    assert_eq!(loaded.items, first.items);
    assert_eq!(loaded.total, Decimal::new(900, 2));

    assert!(
        store
            .update_status(first.id, OrderStatus::Paid, OrderStatus::Fulfilled, Utc::now())
            .await?
    );
    assert!(
        !store
            .update_status(first.id, OrderStatus::Paid, OrderStatus::Cancelled, Utc::now())
            .await?
    );

    let grant = DownloadGrant {
        id: Uuid::new_v4(),
        design_id: "x".into(),
        format: "SVG".into(),
        order_id: first.id,
        expires_at: Utc::now() + chrono::Duration::hours(1),
        consumed: false,
    };
    store.insert_grants(std::slice::from_ref(&grant)).await?;
    assert!(store.consume_grant(grant.id, Utc::now()).await?.is_some());
    assert!(store.consume_grant(grant.id, Utc::now()).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn pg_grant_batches_keep_issue_order_and_renew_lapsed_ones() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run Postgres ledger tests.");
        return Ok(());
    };
    let pool = create_pool(&database_url).await?;
    run_migrations(&pool).await?;
    let store = PgOrderStore::new(pool);
    let order = store
        .insert_unique(order(&format!("TXN-{}", Uuid::new_v4())))
        .await?;

    let issued_at = Utc::now();
    let batch: Vec<DownloadGrant> = (0..6)
        .map(|_| DownloadGrant {
            id: Uuid::new_v4(),
            design_id: "y".into(),
            format: "PNG".into(),
            order_id: order.id,
            expires_at: issued_at + chrono::Duration::hours(1),
            consumed: false,
        })
        .collect();
    store.insert_grants(&batch).await?;

    let ids = |grants: &[DownloadGrant]| grants.iter().map(|g| g.id).collect::<Vec<_>>();
    let first = store.grants_for_order(order.id).await?;
    assert_eq!(ids(&first), ids(&batch));
    assert_eq!(ids(&store.grants_for_order(order.id).await?), ids(&first));

    store.consume_grant(batch[0].id, issued_at).await?;
    let later = issued_at + chrono::Duration::hours(2);
    let until = later + chrono::Duration::hours(72);
    assert_eq!(store.renew_lapsed_grants(order.id, later, until).await?, 5);

    let renewed = store.grants_for_order(order.id).await?;
    assert_eq!(ids(&renewed), ids(&batch));
    assert!(renewed[0].consumed);
    assert!(renewed[1..].iter().all(|g| g.is_redeemable(later)));

    Ok(())
}

#[tokio::test]
async fn pg_session_store_round_trips_and_expires() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run Postgres session tests.");
        return Ok(());
    };
    let pool = create_pool(&database_url).await?;
    run_migrations(&pool).await?;

    let sid = Uuid::new_v4().to_string();
    let data = SessionData {
        items: order("unused").items,
        checkout: None,
        captured: vec!["EXT-earlier".into()],
    };

    let store = PgSessionStore::new(pool.clone(), Duration::from_secs(60));
    store.save(&sid, &data).await?;
    assert_eq!(store.load(&sid).await?, Some(data));
    store.destroy(&sid).await?;
    assert_eq!(store.load(&sid).await?, None);

    let expired = PgSessionStore::new(pool, Duration::ZERO);
    expired.save(&sid, &SessionData::default()).await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(expired.load(&sid).await?, None);
    assert!(expired.purge_expired().await? >= 1);

    Ok(())
}
