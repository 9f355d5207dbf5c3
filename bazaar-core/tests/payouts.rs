mod common;

use bazaar_core::entities::{Channel, EntryKind, PayoutRequest, PayoutStatus};
use bazaar_core::error::LedgerError;
use bazaar_core::gateway::GatewayPayoutStatus;
use bazaar_core::ledger::Posting;
use bazaar_core::workflow::{IssueRefund, NewPayout, ReconcileOutcome};
use common::{Execution, Harness, ctx};
use std::sync::atomic::Ordering;
use std::time::Instant;
use time::OffsetDateTime;
use uuid::Uuid;

fn bank_transfer(amount: i64) -> NewPayout {
    NewPayout {
        amount,
        method: "bank_transfer".into(),
        bank_details: serde_json::json!({ "iban": "DE89370400440532013000" }),
        fraud_score: Some(0.02),
        trust_score: Some(0.9),
    }
}

async fn requested(h: &Harness, balance: i64, amount: i64) -> PayoutRequest {
    let wallet = h.funded_wallet(balance).await;
    h.payouts
        .request_payout(wallet.user_id, bank_transfer(amount), &ctx())
        .await
        .unwrap()
}

async fn refunds_for(h: &Harness, payout: &PayoutRequest) -> usize {
    let payout_id = payout.id.to_string();
    h.store
        .ledger_entries()
        .await
        .iter()
        .filter(|e| e.kind == EntryKind::Refund && e.ref_id.as_deref() == Some(payout_id.as_str()))
        .count()
}

async fn balance_of(h: &Harness, payout: &PayoutRequest) -> (i64, i64) {
    let wallet = h
        .ledger
        .wallet_for_user(payout.user_id)
        .await
        .unwrap()
        .unwrap();
    (wallet.balance, wallet.held_amount)
}

#[tokio::test]
async fn request_places_a_hold_against_available_funds() {
    let h = Harness::new();
    let payout = requested(&h, 1_000, 400).await;
    assert_eq!(payout.status, PayoutStatus::Pending);
    assert_eq!(balance_of(&h, &payout).await, (1_000, 400));

    let err = h
        .payouts
        .request_payout(payout.user_id, bank_transfer(700), &ctx())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientFunds {
            available: 600,
            requested: 700
        }
    ));
}

#[tokio::test]
async fn approved_payout_completes_through_the_gateway() {
    let h = Harness::new();
    let payout = requested(&h, 1_000, 400).await;
    let admin = Uuid::now_v7();

    let done = h
        .payouts
        .approve_payout(payout.id, admin, "looks fine", &ctx())
        .await
        .unwrap();

    assert_eq!(done.status, PayoutStatus::Completed);
    assert_eq!(done.gateway_id, Some(format!("gw-{}", payout.id)));
    assert_eq!(done.reviewed_by, Some(admin));
    assert_eq!(balance_of(&h, &payout).await, (600, 0));

    let pushes = h.events_on(Channel::NotifyPush).await;
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].payload["template_key"], "payout.completed");
    assert_eq!(pushes[0].payload["priority"], "high");

    let err = h
        .payouts
        .approve_payout(payout.id, admin, "again", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { from: "completed", .. }));
    assert_eq!(h.gateway.executed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn gateway_rejection_compensates_in_full() {
    let h = Harness::new();
    h.gateway.set_execution(Execution::Reject("account closed".into()));
    let payout = requested(&h, 1_000, 1_000).await;

    let failed = h
        .payouts
        .approve_payout(payout.id, Uuid::now_v7(), "ok", &ctx())
        .await
        .unwrap();

    assert_eq!(failed.status, PayoutStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("account closed"));
    assert_eq!(balance_of(&h, &payout).await, (1_000, 0));
    assert_eq!(refunds_for(&h, &payout).await, 1);
}

#[tokio::test]
async fn payout_reported_failed_during_reconciliation_is_compensated_once() {
    let h = Harness::new();
    h.gateway.set_execution(Execution::Unavailable);
    let payout = requested(&h, 1_000, 1_000).await;

    let approved = h
        .payouts
        .approve_payout(payout.id, Uuid::now_v7(), "ok", &ctx())
        .await
        .unwrap();
    assert_eq!(approved.status, PayoutStatus::Approved);
    assert_eq!(balance_of(&h, &payout).await, (0, 0));

    h.gateway.set_status(
        payout.id.to_string(),
        GatewayPayoutStatus::Failed {
            reason: Some("beneficiary bank rejected".into()),
        },
    );
    let now = OffsetDateTime::now_utc();
    let outcome = h.payouts.reconcile(&approved, now, &ctx()).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Compensated);

    // A second pass over a stale copy finds the payout already failed.
    h.payouts.reconcile(&approved, now, &ctx()).await.unwrap();

    assert_eq!(balance_of(&h, &payout).await, (1_000, 0));
    assert_eq!(refunds_for(&h, &payout).await, 1);
    assert_eq!(
        h.payouts.payout(payout.id).await.unwrap().status,
        PayoutStatus::Failed
    );
}

#[tokio::test]
async fn gateway_timeout_leaves_payout_approved_for_reconciliation() {
    let h = Harness::new();
    h.gateway.set_execution(Execution::Hang);
    let payout = requested(&h, 500, 200).await;

    let started = Instant::now();
    let approved = h
        .payouts
        .approve_payout(payout.id, Uuid::now_v7(), "ok", &ctx())
        .await
        .unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
    assert_eq!(approved.status, PayoutStatus::Approved);
    assert_eq!(balance_of(&h, &payout).await, (300, 0));

    let now = OffsetDateTime::now_utc();
    assert!(h.payouts.reconcilable(now).await.unwrap().is_empty());
    let later = now + time::Duration::minutes(16);
    let due = h.payouts.reconcilable(later).await.unwrap();
    assert_eq!(due.len(), 1);

    h.gateway.set_status(
        payout.id.to_string(),
        GatewayPayoutStatus::Completed {
            gateway_id: Some("gw-late".into()),
        },
    );
    let outcome = h.payouts.reconcile(&due[0], later, &ctx()).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Completed);

    let settled = h.payouts.payout(payout.id).await.unwrap();
    assert_eq!(settled.status, PayoutStatus::Completed);
    assert_eq!(settled.gateway_id.as_deref(), Some("gw-late"));
    assert_eq!(balance_of(&h, &payout).await, (300, 0));
}

#[tokio::test]
async fn payout_pending_too_long_is_abandoned() {
    let h = Harness::new();
    h.gateway.set_execution(Execution::Unavailable);
    let payout = requested(&h, 800, 800).await;
    let approved = h
        .payouts
        .approve_payout(payout.id, Uuid::now_v7(), "ok", &ctx())
        .await
        .unwrap();
    h.gateway
        .set_status(payout.id.to_string(), GatewayPayoutStatus::Pending);

    let approved_at = approved.approved_at.unwrap();
    let soon = approved_at + time::Duration::hours(1);
    assert_eq!(
        h.payouts.reconcile(&approved, soon, &ctx()).await.unwrap(),
        ReconcileOutcome::StillPending
    );
    assert_eq!(balance_of(&h, &payout).await, (0, 0));

    let stale = approved_at + time::Duration::hours(73);
    assert_eq!(
        h.payouts.reconcile(&approved, stale, &ctx()).await.unwrap(),
        ReconcileOutcome::Compensated
    );
    assert_eq!(balance_of(&h, &payout).await, (800, 0));
}

#[tokio::test]
async fn payout_unknown_to_gateway_is_compensated() {
    let h = Harness::new();
    h.gateway.set_execution(Execution::Unavailable);
    let payout = requested(&h, 300, 300).await;
    let approved = h
        .payouts
        .approve_payout(payout.id, Uuid::now_v7(), "ok", &ctx())
        .await
        .unwrap();

    let outcome = h
        .payouts
        .reconcile(&approved, OffsetDateTime::now_utc(), &ctx())
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Compensated);
    assert_eq!(balance_of(&h, &payout).await, (300, 0));
}

#[tokio::test]
async fn rejection_releases_the_hold_without_moving_money() {
    let h = Harness::new();
    let payout = requested(&h, 500, 300).await;
    let admin = Uuid::now_v7();

    let rejected = h
        .payouts
        .reject_payout(payout.id, admin, "suspicious destination", &ctx())
        .await
        .unwrap();
    assert_eq!(rejected.status, PayoutStatus::Rejected);
    assert!(rejected.rejected_at.is_some());
    assert_eq!(balance_of(&h, &payout).await, (500, 0));
    assert_eq!(h.store.ledger_entries().await.len(), 1);
    assert_eq!(h.gateway.executed.load(Ordering::SeqCst), 0);

    let err = h
        .payouts
        .reject_payout(payout.id, admin, "twice", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));

    let records = h.audit.records().await;
    assert!(records.iter().any(|r| r.action == "payout.reject"));
}

#[tokio::test]
async fn frozen_wallet_cannot_request_or_be_paid_out() {
    let h = Harness::new();
    let payout = requested(&h, 500, 100).await;
    let wallet = h
        .ledger
        .wallet_for_user(payout.user_id)
        .await
        .unwrap()
        .unwrap();
    h.ledger
        .freeze(wallet.id, "kyc pending", None, Uuid::now_v7(), &ctx())
        .await
        .unwrap();

    let err = h
        .payouts
        .approve_payout(payout.id, Uuid::now_v7(), "ok", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::WalletFrozen(_)));
    assert_eq!(
        h.payouts.payout(payout.id).await.unwrap().status,
        PayoutStatus::Pending
    );

    let err = h
        .payouts
        .request_payout(payout.user_id, bank_transfer(50), &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::WalletFrozen(_)));

    h.ledger
        .credit(wallet.id, Posting::new(EntryKind::Credit, 25, "sale"), &ctx())
        .await
        .unwrap();
}

fn admin_refund(user_id: Uuid, amount: i64) -> IssueRefund {
    IssueRefund {
        user_id,
        amount,
        reason: "goodwill".into(),
        ref_id: None,
    }
}

#[tokio::test]
async fn refund_keyed_with_a_payout_id_leaves_compensation_intact() {
    let h = Harness::new();
    h.gateway.set_execution(Execution::Reject("account closed".into()));
    let payout = requested(&h, 1_000, 1_000).await;
    let other = h.funded_wallet(0).await;

    let refund = h
        .refunds
        .issue_refund(
            admin_refund(other.user_id, 50),
            Uuid::now_v7(),
            Some(&payout.id.to_string()),
            &ctx(),
        )
        .await
        .unwrap();
    assert!(!refund.replayed);

    let failed = h
        .payouts
        .approve_payout(payout.id, Uuid::now_v7(), "ok", &ctx())
        .await
        .unwrap();

    assert_eq!(failed.status, PayoutStatus::Failed);
    assert_eq!(balance_of(&h, &payout).await, (1_000, 0));
    assert_eq!(refunds_for(&h, &payout).await, 1);
    assert_eq!(h.ledger.wallet(other.id).await.unwrap().balance, 50);
}

#[tokio::test]
async fn refund_keyed_like_a_payout_debit_is_a_fresh_credit() {
    let h = Harness::new();
    let payout = requested(&h, 1_000, 400).await;
    h.payouts
        .approve_payout(payout.id, Uuid::now_v7(), "ok", &ctx())
        .await
        .unwrap();
    let other = h.funded_wallet(100).await;

    let refund = h
        .refunds
        .issue_refund(
            admin_refund(other.user_id, 30),
            Uuid::now_v7(),
            Some(&format!("payout:{}:debit", payout.id)),
            &ctx(),
        )
        .await
        .unwrap();

    assert!(!refund.replayed);
    assert_eq!(refund.value.wallet_id, other.id);
    assert_eq!(refund.value.kind, EntryKind::Refund);
    assert_eq!(h.ledger.wallet(other.id).await.unwrap().balance, 130);
    assert_eq!(balance_of(&h, &payout).await, (600, 0));
}
