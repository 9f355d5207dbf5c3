mod common;

use bazaar_core::entities::{Channel, EntryKind, ListingStatus, WalletStatus};
use bazaar_core::error::LedgerError;
use bazaar_core::ledger::Posting;
use bazaar_core::moderation::USER_BLOCKED_REASON;
use common::{Harness, ctx};
use uuid::Uuid;

#[tokio::test]
async fn approval_activates_and_rejection_notifies_the_seller() {
    let h = Harness::new();
    let seller = Uuid::now_v7();
    let admin = Uuid::now_v7();

    let first = h
        .moderation
        .submit_listing(seller, "Espresso machine", &ctx())
        .await
        .unwrap();
    assert_eq!(first.status, ListingStatus::PendingReview);
    assert!(first.expires_at.is_none());

    let approved = h
        .moderation
        .approve_listing(first.id, admin, "ok", &ctx())
        .await
        .unwrap();
    assert_eq!(approved.status, ListingStatus::Active);
    let lifetime = approved.expires_at.unwrap() - approved.updated_at;
    assert_eq!(lifetime, time::Duration::days(30));

    let second = h
        .moderation
        .submit_listing(seller, "Replica watch", &ctx())
        .await
        .unwrap();
    let rejected = h
        .moderation
        .reject_listing(second.id, admin, "counterfeit goods", &ctx())
        .await
        .unwrap();
    assert_eq!(rejected.status, ListingStatus::Rejected);

    let err = h
        .moderation
        .approve_listing(second.id, admin, "changed my mind", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { from: "rejected", .. }));

    let pushes = h.events_on(Channel::NotifyPush).await;
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].payload["template_key"], "listing.rejected");
    assert_eq!(pushes[0].payload["data"]["reason"], "counterfeit goods");

    let actions: Vec<_> = h.audit.records().await.iter().map(|r| r.action).collect();
    assert_eq!(actions, vec!["listing.approve", "listing.reject"]);
}

#[tokio::test]
async fn only_the_seller_can_renew() {
    let h = Harness::new();
    let seller = Uuid::now_v7();
    let listing = h
        .moderation
        .submit_listing(seller, "Canoe", &ctx())
        .await
        .unwrap();

    let err = h
        .moderation
        .renew_listing(listing.id, seller, 7, &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));

    h.moderation
        .approve_listing(listing.id, Uuid::now_v7(), "ok", &ctx())
        .await
        .unwrap();
    let stranger = Uuid::now_v7();
    let err = h
        .moderation
        .renew_listing(listing.id, stranger, 7, &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Forbidden { actor, .. } if actor == stranger));

    let err = h
        .moderation
        .renew_listing(listing.id, seller, 0, &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(0)));
}

#[tokio::test]
async fn blocking_a_user_freezes_the_wallet_and_announces_it() {
    let h = Harness::new();
    let wallet = h.funded_wallet(250).await;
    let admin = Uuid::now_v7();

    h.moderation
        .block_user(wallet.user_id, admin, "repeated chargebacks", &ctx())
        .await
        .unwrap();

    let frozen = h.ledger.wallet(wallet.id).await.unwrap();
    assert_eq!(frozen.status, WalletStatus::Frozen);
    assert_eq!(frozen.freeze_reason.as_deref(), Some(USER_BLOCKED_REASON));
    assert!(frozen.freeze_expiry.is_none());

    let blocked = h.events_on(Channel::UserBlocked).await;
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].payload["reason"], "repeated chargebacks");
    assert_eq!(blocked[0].payload["blocked_by"], admin.to_string());

    let err = h
        .ledger
        .debit(wallet.id, Posting::new(EntryKind::Debit, 1, "purchase"), &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::WalletFrozen(_)));
}

#[tokio::test]
async fn settings_changes_are_broadcast_and_audited() {
    let h = Harness::new();
    let admin = Uuid::now_v7();

    h.moderation
        .update_setting("payout.min_amount", serde_json::json!(1_000), admin, &ctx())
        .await
        .unwrap();

    let events = h.events_on(Channel::SettingsUpdate).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["key"], "payout.min_amount");
    assert_eq!(events[0].payload["value"], 1_000);

    let records = h.audit.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entity_id, "payout.min_amount");
}

#[tokio::test]
async fn renewal_past_the_calendar_is_refused() {
    let h = Harness::new();
    let seller = Uuid::now_v7();
    let listing = h
        .moderation
        .submit_listing(seller, "Road bike", &ctx())
        .await
        .unwrap();
    let active = h
        .moderation
        .approve_listing(listing.id, Uuid::now_v7(), "ok", &ctx())
        .await
        .unwrap();

    let err = h
        .moderation
        .renew_listing(listing.id, seller, u32::MAX, &ctx())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::OutOfRange {
            field: "extend_days",
            ..
        }
    ));

    let unchanged = h.moderation.listing(listing.id).await.unwrap();
    assert_eq!(unchanged.status, ListingStatus::Active);
    assert_eq!(unchanged.expires_at, active.expires_at);
}
