use async_trait::async_trait;
use axum::http::StatusCode;
use p2p_escrow::api;
use p2p_escrow::config::Config;
use p2p_escrow::db::init_db;
use p2p_escrow::wallet::ProvisionError;
use p2p_escrow::{
    Asset, Decimal, EntryKind, EscrowMode, FsProofStore, InMemoryDirectory, UserId,
    WalletProvisioner, WalletService,
};
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    wallet: Arc<WalletService>,
    _temp: TempDir,
}

#[derive(Debug)]
struct FixedProvisioner;

#[async_trait]
impl WalletProvisioner for FixedProvisioner {
    async fn provision(&self, user: &UserId, asset: Asset) -> Result<String, ProvisionError> {
        Ok(format!("{}-{}-address", asset.as_str().to_lowercase(), user))
    }
}

async fn setup_test_app(allow_demo_balance: bool) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(p2p_escrow::Repository::new(pool));

    let config = Config {
        port: 0,
        database_path: db_path,
        upload_path: temp_dir.path().join("uploads").to_string_lossy().to_string(),
        max_proof_bytes: 1024,
        escrow_mode: EscrowMode::Advisory,
        swap_btc_usdt_rate: Decimal::from(45000),
        allow_demo_balance,
    };
    let proofs = Arc::new(FsProofStore::new(
        config.upload_path.clone(),
        config.max_proof_bytes,
    ));

    let state = api::AppState::new(repo, config, Arc::new(InMemoryDirectory::new()), proofs)
        .unwrap()
        .with_provisioner(Arc::new(FixedProvisioner));
    let wallet = state.wallet.clone();

    TestApp {
        app: api::create_router(state),
        wallet,
        _temp: temp_dir,
    }
}

async fn request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    user: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header(api::auth::USER_HEADER, user)
        .header("content-type", "application/json")
        .body(match body {
            Some(b) => axum::body::Body::from(b.to_string()),
            None => axum::body::Body::empty(),
        })
        .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[tokio::test]
async fn test_wallets_start_at_zero() {
    let t = setup_test_app(false).await;

    let (status, body) = request(&t.app, "GET", "/v1/wallets", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], "alice");
    let wallets = body["wallets"].as_array().unwrap();
    assert_eq!(wallets.len(), 2);
    assert_eq!(wallets[0]["asset"], "BTC");
    assert_eq!(wallets[0]["balance"], "0");
    assert_eq!(wallets[1]["asset"], "USDT");

    let (status, body) = request(&t.app, "GET", "/v1/wallets/usdt", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["asset"], "USDT");

    let (status, body) = request(&t.app, "GET", "/v1/wallets/DOGE", "alice", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("DOGE"));
}

#[tokio::test]
async fn test_demo_balance_requires_flag() {
    let t = setup_test_app(false).await;
    let (status, _) = request(&t.app, "POST", "/v1/wallets/demo-balance", "alice", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let t = setup_test_app(true).await;
    let (status, body) = request(&t.app, "POST", "/v1/wallets/demo-balance", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["wallets"][0]["balance"], "0.001");
    assert_eq!(body["wallets"][1]["balance"], "1000");

    let (status, body) = request(
        &t.app,
        "GET",
        "/v1/wallets/BTC/transactions",
        "alice",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    let tx = &body["transactions"][0];
    assert_eq!(tx["kind"], "DEPOSIT");
    assert_eq!(tx["amount"], "0.001");
    assert_eq!(tx["balanceAfter"], "0.001");
    assert_eq!(tx["referenceId"], "demo-balance");
}

#[tokio::test]
async fn test_transaction_history_is_newest_first_and_paginated() {
    let t = setup_test_app(false).await;
    let alice = UserId::new("alice");
    for amount in ["1", "2", "3"] {
        t.wallet
            .adjust_single(&alice, Asset::Usdt, d(amount), EntryKind::Deposit, "seed")
            .await
            .unwrap();
    }

    let (status, body) = request(
        &t.app,
        "GET",
        "/v1/wallets/USDT/transactions?limit=2",
        "alice",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["pages"], 2);
    let txs = body["transactions"].as_array().unwrap();
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0]["amount"], "3");
    assert_eq!(txs[0]["balanceAfter"], "6");
    assert_eq!(txs[1]["amount"], "2");

    let (_, body) = request(
        &t.app,
        "GET",
        "/v1/wallets/USDT/transactions",
        "bob",
        None,
    )
    .await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_provision_addresses_once() {
    let t = setup_test_app(false).await;

    let (status, body) = request(&t.app, "POST", "/v1/wallets/provision", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["addresses"]["BTC"], "btc-alice-address");
    assert_eq!(body["addresses"]["USDT"], "usdt-alice-address");

    let (status, again) = request(&t.app, "POST", "/v1/wallets/provision", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again, body);
}

#[tokio::test]
async fn test_swap_quote_execute_and_list() {
    let t = setup_test_app(false).await;
    t.wallet
        .adjust_single(
            &UserId::new("alice"),
            Asset::Btc,
            d("0.02"),
            EntryKind::Deposit,
            "seed",
        )
        .await
        .unwrap();

    let (status, body) = request(
        &t.app,
        "GET",
        "/v1/swaps/quote?from=BTC&to=USDT&amount=0.01",
        "alice",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["toAmount"], "450");
    assert_eq!(body["rate"], "45000");

    let (status, body) = request(
        &t.app,
        "POST",
        "/v1/swaps",
        "alice",
        Some(serde_json::json!({"fromAsset": "BTC", "toAsset": "USDT", "amount": "0.01"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["toAmount"], "450");

    let (status, body) = request(
        &t.app,
        "POST",
        "/v1/swaps",
        "alice",
        Some(serde_json::json!({"fromAsset": "BTC", "toAsset": "USDT", "amount": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", body);

    let (status, _) = request(
        &t.app,
        "POST",
        "/v1/swaps",
        "alice",
        Some(serde_json::json!({"fromAsset": "USDT", "toAsset": "USDT", "amount": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = request(&t.app, "GET", "/v1/swaps", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["swaps"][0]["fromAmount"], "0.01");

    let (_, body) = request(&t.app, "GET", "/v1/wallets/USDT", "alice", None).await;
    assert_eq!(body["balance"], "450");
}
