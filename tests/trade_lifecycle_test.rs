use p2p_escrow::db::{init_db, Pagination};
use p2p_escrow::domain::BalanceKey;
use p2p_escrow::{
    AdvertisementSnapshot, Asset, Decimal, EntryKind, ErrorKind, EscrowMode, InMemoryDirectory,
    LedgerError, Repository, TradeEngine, TradeStatus, TradeType, UserId, ValidationError,
    WalletService,
};
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::assert_ok;

struct Harness {
    wallet: Arc<WalletService>,
    engine: TradeEngine,
    _temp: TempDir,
}

async fn setup(mode: EscrowMode) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let wallet = Arc::new(WalletService::new(Arc::new(Repository::new(pool))));

    Harness {
        engine: TradeEngine::new(wallet.clone(), mode),
        wallet,
        _temp: temp_dir,
    }
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn user(id: &str) -> UserId {
    UserId::new(id)
}

fn sell_ad(owner: &str) -> AdvertisementSnapshot {
    AdvertisementSnapshot::new(
        "ad-sell",
        Asset::Btc,
        TradeType::Sell,
        d("45000"),
        d("100"),
        d("10000"),
        user(owner),
    )
    .unwrap()
}

fn buy_ad(owner: &str) -> AdvertisementSnapshot {
    AdvertisementSnapshot::new(
        "ad-buy",
        Asset::Btc,
        TradeType::Buy,
        d("45000"),
        d("100"),
        d("10000"),
        user(owner),
    )
    .unwrap()
}

async fn fund(wallet: &WalletService, who: &str, asset: Asset, amount: &str) {
    wallet
        .adjust_single(&user(who), asset, d(amount), EntryKind::Deposit, "seed")
        .await
        .unwrap();
}

async fn btc(wallet: &WalletService, who: &UserId) -> Decimal {
    wallet.get_balance(who, Asset::Btc).await.unwrap()
}

#[tokio::test]
async fn test_sell_ad_release_moves_asset_to_buyer() {
    let h = setup(EscrowMode::Advisory).await;
    fund(&h.wallet, "seller", Asset::Btc, "1").await;
    let (seller, buyer) = (user("seller"), user("buyer"));

    let trade = h.engine.open(&sell_ad("seller"), &buyer, d("4500")).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Pending);
    assert_eq!(trade.asset_amount, d("0.1"));
    assert_eq!(trade.buyer_id, buyer);
    assert_eq!(trade.seller_id, seller);
    assert!(!trade.escrow_held);

    let trade = h
        .engine
        .submit_payment_proof(trade.id, &buyer, "/uploads/proof.png")
        .await
        .unwrap();
    assert_eq!(trade.status, TradeStatus::Paid);
    assert_eq!(trade.payment_proof_ref.as_deref(), Some("/uploads/proof.png"));
    // Payment proof alone moves nothing.
    assert_eq!(btc(&h.wallet, &seller).await, d("1"));

    let trade = h.engine.release(trade.id, &seller).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Completed);
    assert!(trade.completed_at.is_some());

    assert_eq!(btc(&h.wallet, &seller).await, d("0.9"));
    assert_eq!(btc(&h.wallet, &buyer).await, d("0.1"));

    let entries = h
        .wallet
        .repo()
        .entries_by_reference(&trade.id.to_string())
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].delta, d("-0.1"));
    assert_eq!(entries[1].delta, d("0.1"));

    let stored = h.engine.get_trade(trade.id, &buyer).await.unwrap();
    assert_eq!(stored.status, TradeStatus::Completed);
    assert_eq!(stored.version, trade.version);

    for audit in h.wallet.audit_all().await.unwrap() {
        assert!(audit.is_consistent());
    }
}

#[tokio::test]
async fn test_release_with_insufficient_seller_balance_changes_nothing() {
    let h = setup(EscrowMode::Advisory).await;
    fund(&h.wallet, "seller", Asset::Btc, "0.1").await;
    let (seller, buyer) = (user("seller"), user("buyer"));

    let trade = h.engine.open(&sell_ad("seller"), &buyer, d("4500")).await.unwrap();
    h.engine
        .submit_payment_proof(trade.id, &buyer, "proof")
        .await
        .unwrap();

    // The seller spends half of it elsewhere before releasing.
    h.wallet
        .transfer(&seller, &user("elsewhere"), Asset::Btc, d("0.05"), "other")
        .await
        .unwrap();

    let err = h.engine.release(trade.id, &seller).await.unwrap_err();
    match &err {
        LedgerError::InsufficientSellerBalance {
            available, required, ..
        } => {
            assert_eq!(*available, d("0.05"));
            assert_eq!(*required, d("0.1"));
        }
        other => panic!("expected InsufficientSellerBalance, got {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);

    let stored = h.engine.get_trade(trade.id, &seller).await.unwrap();
    assert_eq!(stored.status, TradeStatus::Paid);
    assert!(stored.completed_at.is_none());
    assert!(h
        .wallet
        .repo()
        .entries_by_reference(&trade.id.to_string())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(btc(&h.wallet, &seller).await, d("0.05"));
    assert!(btc(&h.wallet, &buyer).await.is_zero());

    // Topping up lets the same trade complete.
    fund(&h.wallet, "seller", Asset::Btc, "0.05").await;
    let done = h.engine.release(trade.id, &seller).await.unwrap();
    assert_eq!(done.status, TradeStatus::Completed);
}

#[tokio::test]
async fn test_open_validation() {
    let h = setup(EscrowMode::Advisory).await;
    fund(&h.wallet, "seller", Asset::Btc, "1").await;
    let ad = sell_ad("seller");
    let buyer = user("buyer");

    for amount in ["99.99", "10000.01"] {
        let err = h.engine.open(&ad, &buyer, d(amount)).await.unwrap_err();
        assert!(
            matches!(err, LedgerError::Validation(ValidationError::InvalidAmountRange { .. })),
            "amount {} accepted",
            amount
        );
    }
    assert_ok!(h.engine.open(&ad, &buyer, d("100")).await);
    assert_ok!(h.engine.open(&ad, &buyer, d("10000")).await);

    let err = h.engine.open(&ad, &user("seller"), d("500")).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Validation(ValidationError::SelfTradeForbidden)
    ));
}

#[tokio::test]
async fn test_open_checks_seller_balance_for_sell_ads_only() {
    let h = setup(EscrowMode::Advisory).await;
    fund(&h.wallet, "seller", Asset::Btc, "0.01").await;

    let err = h
        .engine
        .open(&sell_ad("seller"), &user("buyer"), d("4500"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientSellerBalance { .. }));
    let (_, total) = h
        .engine
        .list_trades(&user("buyer"), Pagination::default())
        .await
        .unwrap();
    assert_eq!(total, 0);

    // On a BUY ad the initiator sells; the check is deferred to release.
    let trade = h
        .engine
        .open(&buy_ad("owner"), &user("initiator"), d("4500"))
        .await
        .unwrap();
    assert_eq!(trade.buyer_id, user("owner"));
    assert_eq!(trade.seller_id, user("initiator"));
}

#[tokio::test]
async fn test_open_from_directory() {
    let h = setup(EscrowMode::Advisory).await;
    fund(&h.wallet, "seller", Asset::Btc, "1").await;
    let directory = InMemoryDirectory::new().with_advertisement(sell_ad("seller"));

    let trade = h
        .engine
        .open_from_directory(&directory, "ad-sell", &user("buyer"), d("900"))
        .await
        .unwrap();
    assert_eq!(trade.asset_amount, d("0.02"));

    let err = h
        .engine
        .open_from_directory(&directory, "missing", &user("buyer"), d("900"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    directory.deactivate("ad-sell");
    let err = h
        .engine
        .open_from_directory(&directory, "ad-sell", &user("buyer"), d("900"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // The open trade keeps its own terms after the ad goes away.
    let stored = h.engine.get_trade(trade.id, &user("buyer")).await.unwrap();
    assert_eq!(stored.advertisement.rate, d("45000"));
}

#[tokio::test]
async fn test_only_the_right_party_may_act() {
    let h = setup(EscrowMode::Advisory).await;
    fund(&h.wallet, "seller", Asset::Btc, "1").await;
    let (seller, buyer, outsider) = (user("seller"), user("buyer"), user("outsider"));
    let trade = h.engine.open(&sell_ad("seller"), &buyer, d("4500")).await.unwrap();

    let err = h
        .engine
        .submit_payment_proof(trade.id, &seller, "proof")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = h.engine.cancel(trade.id, &outsider).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = h.engine.get_trade(trade.id, &outsider).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    h.engine
        .submit_payment_proof(trade.id, &buyer, "proof")
        .await
        .unwrap();
    let err = h.engine.release(trade.id, &buyer).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(btc(&h.wallet, &buyer).await.is_zero());
}

#[tokio::test]
async fn test_invalid_transitions() {
    let h = setup(EscrowMode::Advisory).await;
    fund(&h.wallet, "seller", Asset::Btc, "1").await;
    let (seller, buyer) = (user("seller"), user("buyer"));
    let trade = h.engine.open(&sell_ad("seller"), &buyer, d("4500")).await.unwrap();

    // Release before payment.
    let err = h.engine.release(trade.id, &seller).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidStateTransition {
            from: TradeStatus::Pending,
            ..
        }
    ));

    h.engine
        .submit_payment_proof(trade.id, &buyer, "proof")
        .await
        .unwrap();

    // Cancel after payment.
    let err = h.engine.cancel(trade.id, &buyer).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidStateTransition {
            from: TradeStatus::Paid,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::StateConflict);

    // Second proof.
    let err = h
        .engine
        .submit_payment_proof(trade.id, &buyer, "again")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    let stored = h.engine.get_trade(trade.id, &buyer).await.unwrap();
    assert_eq!(stored.payment_proof_ref.as_deref(), Some("proof"));
}

#[tokio::test]
async fn test_dispute_freezes_trade_without_moving_funds() {
    let h = setup(EscrowMode::Advisory).await;
    fund(&h.wallet, "seller", Asset::Btc, "1").await;
    let (seller, buyer) = (user("seller"), user("buyer"));
    let trade = h.engine.open(&sell_ad("seller"), &buyer, d("4500")).await.unwrap();
    h.engine
        .submit_payment_proof(trade.id, &buyer, "proof")
        .await
        .unwrap();

    let err = h.engine.dispute(trade.id, &buyer, "   ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let trade = h
        .engine
        .dispute(trade.id, &buyer, "seller unresponsive")
        .await
        .unwrap();
    assert_eq!(trade.status, TradeStatus::Disputed);
    assert_eq!(trade.dispute_reason.as_deref(), Some("seller unresponsive"));

    for result in [
        h.engine.release(trade.id, &seller).await,
        h.engine.cancel(trade.id, &seller).await,
        h.engine.dispute(trade.id, &seller, "me too").await,
    ] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::StateConflict);
    }
    assert_eq!(btc(&h.wallet, &seller).await, d("1"));
    assert!(btc(&h.wallet, &buyer).await.is_zero());
}

#[tokio::test]
async fn test_cancel_pending_trade() {
    let h = setup(EscrowMode::Advisory).await;
    fund(&h.wallet, "seller", Asset::Btc, "1").await;
    let trade = h
        .engine
        .open(&sell_ad("seller"), &user("buyer"), d("4500"))
        .await
        .unwrap();

    let trade = h.engine.cancel(trade.id, &user("seller")).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Cancelled);
    assert_eq!(btc(&h.wallet, &user("seller")).await, d("1"));

    let err = h
        .engine
        .submit_payment_proof(trade.id, &user("buyer"), "late")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
}

#[tokio::test]
async fn test_unknown_trade_is_not_found() {
    let h = setup(EscrowMode::Advisory).await;
    let err = h
        .engine
        .release(p2p_escrow::TradeId::new_v4(), &user("seller"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_reserve_mode_holds_and_refunds() {
    let h = setup(EscrowMode::Reserve).await;
    fund(&h.wallet, "seller", Asset::Btc, "1").await;
    let (seller, buyer, escrow) = (user("seller"), user("buyer"), UserId::escrow());

    let trade = h.engine.open(&sell_ad("seller"), &buyer, d("4500")).await.unwrap();
    assert!(trade.escrow_held);
    assert_eq!(btc(&h.wallet, &seller).await, d("0.9"));
    assert_eq!(btc(&h.wallet, &escrow).await, d("0.1"));

    h.engine.cancel(trade.id, &buyer).await.unwrap();
    assert_eq!(btc(&h.wallet, &seller).await, d("1"));
    assert!(btc(&h.wallet, &escrow).await.is_zero());

    let kinds: Vec<EntryKind> = h
        .wallet
        .repo()
        .entries_by_reference(&trade.id.to_string())
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EntryKind::EscrowHold,
            EntryKind::EscrowHold,
            EntryKind::EscrowRelease,
            EntryKind::EscrowRelease
        ]
    );
}

#[tokio::test]
async fn test_reserve_mode_release_pays_buyer_from_escrow() {
    let h = setup(EscrowMode::Reserve).await;
    fund(&h.wallet, "seller", Asset::Btc, "0.1").await;
    let (seller, buyer) = (user("seller"), user("buyer"));

    let trade = h.engine.open(&sell_ad("seller"), &buyer, d("4500")).await.unwrap();
    assert!(btc(&h.wallet, &seller).await.is_zero());

    // Funds are reserved, so a second trade on the same balance is refused up front.
    let err = h
        .engine
        .open(&sell_ad("seller"), &user("other"), d("100"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientSellerBalance { .. }));

    h.engine
        .submit_payment_proof(trade.id, &buyer, "proof")
        .await
        .unwrap();

    // A trade opened under reserve settles from escrow even after the mode changes.
    let advisory = TradeEngine::new(h.wallet.clone(), EscrowMode::Advisory);
    let done = advisory.release(trade.id, &seller).await.unwrap();
    assert_eq!(done.status, TradeStatus::Completed);
    assert_eq!(btc(&h.wallet, &buyer).await, d("0.1"));
    assert!(btc(&h.wallet, &UserId::escrow()).await.is_zero());

    let escrow_key = BalanceKey::new(UserId::escrow(), Asset::Btc);
    let audit = h.wallet.audit(&escrow_key.user, escrow_key.asset).await.unwrap();
    assert!(audit.is_consistent());
    assert_eq!(audit.entry_count, 2);
}

#[tokio::test]
async fn test_reserve_mode_dispute_keeps_funds_held() {
    let h = setup(EscrowMode::Reserve).await;
    fund(&h.wallet, "seller", Asset::Btc, "1").await;
    let (seller, buyer, escrow) = (user("seller"), user("buyer"), UserId::escrow());

    let trade = h.engine.open(&sell_ad("seller"), &buyer, d("4500")).await.unwrap();
    h.engine
        .submit_payment_proof(trade.id, &buyer, "proof")
        .await
        .unwrap();
    let trade = h
        .engine
        .dispute(trade.id, &buyer, "seller unresponsive")
        .await
        .unwrap();
    assert_eq!(trade.status, TradeStatus::Disputed);
    assert!(trade.escrow_held);

    assert_eq!(btc(&h.wallet, &seller).await, d("0.9"));
    assert_eq!(btc(&h.wallet, &escrow).await, d("0.1"));
    assert!(btc(&h.wallet, &buyer).await.is_zero());

    let kinds: Vec<EntryKind> = h
        .wallet
        .repo()
        .entries_by_reference(&trade.id.to_string())
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(kinds, vec![EntryKind::EscrowHold, EntryKind::EscrowHold]);
}

#[tokio::test]
async fn test_reserve_mode_buy_ad_holds_from_initiator() {
    let h = setup(EscrowMode::Reserve).await;
    let (owner, initiator, escrow) = (user("owner"), user("initiator"), UserId::escrow());

    // The initiator sells on a BUY ad, so the hold comes from their balance.
    fund(&h.wallet, "initiator", Asset::Btc, "0.05").await;
    let err = h
        .engine
        .open(&buy_ad("owner"), &initiator, d("4500"))
        .await
        .unwrap_err();
    match err {
        LedgerError::InsufficientSellerBalance {
            seller, required, ..
        } => {
            assert_eq!(seller, initiator);
            assert_eq!(required, d("0.1"));
        }
        other => panic!("expected InsufficientSellerBalance, got {:?}", other),
    }
    assert_eq!(btc(&h.wallet, &initiator).await, d("0.05"));
    assert!(btc(&h.wallet, &escrow).await.is_zero());
    let (_, total) = h
        .engine
        .list_trades(&initiator, Pagination::default())
        .await
        .unwrap();
    assert_eq!(total, 0);

    fund(&h.wallet, "initiator", Asset::Btc, "0.05").await;
    let trade = h
        .engine
        .open(&buy_ad("owner"), &initiator, d("4500"))
        .await
        .unwrap();
    assert!(trade.escrow_held);
    assert_eq!(trade.seller_id, initiator);
    assert_eq!(trade.buyer_id, owner);
    assert!(btc(&h.wallet, &initiator).await.is_zero());
    assert_eq!(btc(&h.wallet, &escrow).await, d("0.1"));
    assert!(btc(&h.wallet, &owner).await.is_zero());
}

#[tokio::test]
async fn test_list_trades_for_both_roles() {
    let h = setup(EscrowMode::Advisory).await;
    fund(&h.wallet, "alice", Asset::Btc, "1").await;
    fund(&h.wallet, "bob", Asset::Btc, "1").await;

    h.engine.open(&sell_ad("alice"), &user("bob"), d("450")).await.unwrap();
    h.engine.open(&sell_ad("bob"), &user("alice"), d("450")).await.unwrap();
    h.engine.open(&sell_ad("bob"), &user("carol"), d("450")).await.unwrap();

    let (trades, total) = h
        .engine
        .list_trades(&user("alice"), Pagination::default())
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(trades.len(), 2);

    let (page, total) = h
        .engine
        .list_trades(&user("bob"), Pagination::new(2, 2))
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 1);
}
