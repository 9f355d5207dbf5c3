mod common;

use bazaar_core::entities::{Channel, EntryKind, RefundStatus};
use bazaar_core::error::LedgerError;
use bazaar_core::workflow::{IssueRefund, NewRefund};
use common::{Harness, ctx};
use uuid::Uuid;

#[tokio::test]
async fn dispute_refund_is_applied_once() {
    let h = Harness::new();
    let wallet = h.funded_wallet(200).await;
    let admin = Uuid::now_v7();
    let updates_before = h.events_on(Channel::WalletUpdate).await.len();

    let refund = IssueRefund {
        user_id: wallet.user_id,
        amount: 300,
        reason: "dispute resolved".into(),
        ref_id: Some("order-981".into()),
    };
    let first = h
        .refunds
        .issue_refund(refund.clone(), admin, Some("r-42"), &ctx())
        .await
        .unwrap();
    assert!(!first.replayed);
    assert_eq!(first.value.kind, EntryKind::Refund);
    assert_eq!(first.value.amount, 300);
    assert_eq!(first.value.balance_after, 500);

    let updates = h.events_on(Channel::WalletUpdate).await;
    assert_eq!(updates.len(), updates_before + 1);
    let update = updates.last().unwrap();
    assert_eq!(update.payload["balance"], 500);
    assert_eq!(update.payload["transaction"]["kind"], "refund");

    let replay = h
        .refunds
        .issue_refund(refund, admin, Some("r-42"), &ctx())
        .await
        .unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.value.id, first.value.id);

    assert_eq!(h.ledger.wallet(wallet.id).await.unwrap().balance, 500);
    let refunds = h
        .store
        .ledger_entries()
        .await
        .into_iter()
        .filter(|e| e.kind == EntryKind::Refund)
        .count();
    assert_eq!(refunds, 1);
    assert_eq!(h.events_on(Channel::WalletUpdate).await.len(), updates_before + 1);

    let audited: Vec<_> = h
        .audit
        .records()
        .await
        .into_iter()
        .filter(|r| r.action == "refund.issue")
        .collect();
    assert_eq!(audited.len(), 1);
    assert_eq!(audited[0].reason.as_deref(), Some("dispute resolved"));
}

#[tokio::test]
async fn issuing_a_refund_requires_a_key() {
    let h = Harness::new();
    let wallet = h.funded_wallet(0).await;
    let refund = IssueRefund {
        user_id: wallet.user_id,
        amount: 50,
        reason: "goodwill".into(),
        ref_id: None,
    };

    for key in [None, Some(""), Some("   ")] {
        let err = h
            .refunds
            .issue_refund(refund.clone(), Uuid::now_v7(), key, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::IdempotencyKeyRequired));
    }
    assert_eq!(h.ledger.wallet(wallet.id).await.unwrap().balance, 0);
}

#[tokio::test]
async fn refunds_reach_frozen_wallets() {
    let h = Harness::new();
    let wallet = h.funded_wallet(10).await;
    h.ledger
        .freeze(wallet.id, "fraud review", None, Uuid::now_v7(), &ctx())
        .await
        .unwrap();

    h.refunds
        .issue_refund(
            IssueRefund {
                user_id: wallet.user_id,
                amount: 90,
                reason: "item never shipped".into(),
                ref_id: None,
            },
            Uuid::now_v7(),
            Some("r-frozen"),
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(h.ledger.wallet(wallet.id).await.unwrap().balance, 100);
}

#[tokio::test]
async fn requested_refund_is_credited_on_approval() {
    let h = Harness::new();
    let wallet = h.funded_wallet(0).await;
    let admin = Uuid::now_v7();

    let request = h
        .refunds
        .request_refund(
            wallet.user_id,
            NewRefund {
                amount: 75,
                reason: "damaged in transit".into(),
                ref_id: Some("order-12".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(request.status, RefundStatus::Pending);

    let approved = h
        .refunds
        .approve_refund(request.id, admin, "photos confirm damage", &ctx())
        .await
        .unwrap();
    assert_eq!(approved.status, RefundStatus::Approved);
    assert!(approved.ledger_entry_id.is_some());
    assert_eq!(h.ledger.wallet(wallet.id).await.unwrap().balance, 75);

    let err = h
        .refunds
        .approve_refund(request.id, admin, "again", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { from: "approved", .. }));
    assert_eq!(h.ledger.wallet(wallet.id).await.unwrap().balance, 75);

    let pushes = h.events_on(Channel::NotifyPush).await;
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].payload["template_key"], "refund.approved");
}

#[tokio::test]
async fn rejected_refund_moves_no_money() {
    let h = Harness::new();
    let wallet = h.funded_wallet(40).await;
    let request = h
        .refunds
        .request_refund(
            wallet.user_id,
            NewRefund {
                amount: 40,
                reason: "changed my mind".into(),
                ref_id: None,
            },
        )
        .await
        .unwrap();

    let rejected = h
        .refunds
        .reject_refund(request.id, Uuid::now_v7(), "outside return window", &ctx())
        .await
        .unwrap();
    assert_eq!(rejected.status, RefundStatus::Rejected);
    assert!(rejected.ledger_entry_id.is_none());
    assert_eq!(h.ledger.wallet(wallet.id).await.unwrap().balance, 40);
}
