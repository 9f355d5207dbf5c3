use super::templates;
use crate::audit::{AuditRecord, record_quietly};
use crate::config::PayoutConfig;
use crate::context::RequestContext;
use crate::entities::{Channel, EntryKind, PayoutRequest, PayoutStatus};
use crate::error::LedgerError;
use crate::gateway::{GatewayClient, GatewayError, GatewayPayoutStatus};
use crate::ledger::{self, LedgerEngine, Posting};
use crate::notify::{NotificationJob, NotificationSender, enqueue_quietly};
use crate::store::{Store, UnitOfWork};
use bazaar_sdk::objects::NotificationPriority;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

/// A payout request as submitted by the wallet owner.
#[derive(Debug, Clone)]
pub struct NewPayout {
    pub amount: i64,
    pub method: String,
    pub bank_details: serde_json::Value,
    pub fraud_score: Option<f64>,
    pub trust_score: Option<f64>,
}

/// What reconciliation did with one approved payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Completed,
    Compensated,
    /// The gateway is still working on it and the payout is not yet abandoned.
    StillPending,
    /// The status check failed or timed out; retried next run.
    Deferred,
}

fn transition_error(payout: &PayoutRequest, to: PayoutStatus) -> LedgerError {
    LedgerError::InvalidTransition {
        entity: "payout",
        id: payout.id,
        from: payout.status.as_str(),
        to: to.as_str(),
    }
}

async fn lock_payout(
    uow: &mut dyn UnitOfWork,
    payout_id: Uuid,
) -> Result<PayoutRequest, LedgerError> {
    uow.lock_payout(payout_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("payout", payout_id))
}

#[derive(Clone)]
pub struct PayoutWorkflow {
    ledger: LedgerEngine,
    store: Arc<dyn Store>,
    gateway: Arc<dyn GatewayClient>,
    notifier: Arc<dyn NotificationSender>,
    config: PayoutConfig,
}

impl PayoutWorkflow {
    pub fn new(
        ledger: LedgerEngine,
        store: Arc<dyn Store>,
        gateway: Arc<dyn GatewayClient>,
        notifier: Arc<dyn NotificationSender>,
        config: PayoutConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            gateway,
            notifier,
            config,
        }
    }

    pub async fn payout(&self, payout_id: Uuid) -> Result<PayoutRequest, LedgerError> {
        self.store
            .payout(payout_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("payout", payout_id))
    }

    /// Open a payout request and place its amount on hold.
    #[tracing::instrument(skip_all, err, fields(user_id = %user_id, amount = request.amount))]
    pub async fn request_payout(
        &self,
        user_id: Uuid,
        request: NewPayout,
        ctx: &RequestContext,
    ) -> Result<PayoutRequest, LedgerError> {
        if request.amount <= 0 {
            return Err(LedgerError::InvalidAmount(request.amount));
        }
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut wallet = ledger::lock_user_wallet(uow.as_mut(), user_id, now).await?;
        ledger::ensure_not_frozen(&wallet, now)?;
        if wallet.available() < request.amount {
            return Err(LedgerError::InsufficientFunds {
                available: wallet.available(),
                requested: request.amount,
            });
        }

        let payout = PayoutRequest {
            id: Uuid::now_v7(),
            user_id,
            amount: request.amount,
            method: request.method,
            bank_details: request.bank_details,
            status: PayoutStatus::Pending,
            gateway_id: None,
            fraud_score: request.fraud_score,
            trust_score: request.trust_score,
            reviewed_by: None,
            review_note: None,
            failure_reason: None,
            created_at: now,
            approved_at: None,
            rejected_at: None,
            completed_at: None,
            failed_at: None,
        };
        uow.insert_payout(&payout).await?;

        wallet.held_amount += payout.amount;
        wallet.updated_at = now;
        uow.save_wallet(&wallet).await?;
        self.ledger
            .outbox()
            .emit(
                uow.as_mut(),
                Channel::WalletUpdate,
                &wallet.to_update_payload(None, now),
                ctx,
            )
            .await?;
        uow.commit().await?;
        self.ledger.outbox().committed();

        info!(payout_id = %payout.id, "Payout requested");
        Ok(payout)
    }

    /// Approve, debit and execute a pending payout.
    ///
    /// The debit commits before the gateway is called. If the gateway call
    /// times out or fails transiently the payout is returned still
    /// `approved` and reconciliation settles it later.
    #[tracing::instrument(skip_all, err, fields(payout_id = %payout_id, admin_id = %admin_id))]
    pub async fn approve_payout(
        &self,
        payout_id: Uuid,
        admin_id: Uuid,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<PayoutRequest, LedgerError> {
        let payout = self.approve_and_debit(payout_id, admin_id, reason, ctx).await?;

        record_quietly(
            self.ledger.audit(),
            AuditRecord::new("payout.approve", "payout", payout.id, ctx)
                .actor(admin_id)
                .reason(reason)
                .metadata(serde_json::json!({ "amount": payout.amount })),
        )
        .await;

        let execution = tokio::time::timeout(
            self.config.gateway_timeout,
            self.gateway
                .execute_payout(payout.id, payout.amount, &payout.bank_details),
        )
        .await;

        match execution {
            Ok(Ok(gateway_id)) => self.complete_payout(payout.id, Some(gateway_id), ctx).await,
            Ok(Err(GatewayError::Rejected(reason))) => {
                self.fail_and_compensate(payout.id, &reason, ctx).await
            }
            Ok(Err(e)) => {
                warn!(payout_id = %payout.id, error = %e, "Payout execution failed, deferred to reconciliation");
                Ok(payout)
            }
            Err(_) => {
                warn!(
                    payout_id = %payout.id,
                    timeout = ?self.config.gateway_timeout,
                    "Payout execution timed out, deferred to reconciliation"
                );
                Ok(payout)
            }
        }
    }

    async fn approve_and_debit(
        &self,
        payout_id: Uuid,
        admin_id: Uuid,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<PayoutRequest, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut payout = lock_payout(uow.as_mut(), payout_id).await?;
        if !payout.status.can_transition_to(PayoutStatus::Approved) {
            return Err(transition_error(&payout, PayoutStatus::Approved));
        }

        let mut wallet = ledger::lock_user_wallet(uow.as_mut(), payout.user_id, now).await?;
        ledger::ensure_not_frozen(&wallet, now)?;

        wallet.held_amount = (wallet.held_amount - payout.amount).max(0);
        let posting = Posting::new(EntryKind::Payout, payout.amount, format!("Payout via {}", payout.method))
            .ref_id(Some(payout.id.to_string()))
            .idempotency_key(Some(payout.debit_key()))
            .metadata(serde_json::json!({ "payout_id": payout.id, "admin_id": admin_id }));
        self.ledger
            .post(uow.as_mut(), &mut wallet, posting, ctx, now)
            .await?;

        payout.status = PayoutStatus::Approved;
        payout.approved_at = Some(now);
        payout.reviewed_by = Some(admin_id);
        payout.review_note = Some(reason.to_string());
        uow.save_payout(&payout).await?;
        uow.commit().await?;
        self.ledger.outbox().committed();

        info!(payout_id = %payout.id, amount = payout.amount, "Payout approved and debited");
        Ok(payout)
    }

    /// Release the hold and close the request without moving money.
    #[tracing::instrument(skip_all, err, fields(payout_id = %payout_id, admin_id = %admin_id))]
    pub async fn reject_payout(
        &self,
        payout_id: Uuid,
        admin_id: Uuid,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<PayoutRequest, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut payout = lock_payout(uow.as_mut(), payout_id).await?;
        if !payout.status.can_transition_to(PayoutStatus::Rejected) {
            return Err(transition_error(&payout, PayoutStatus::Rejected));
        }

        let mut wallet = ledger::lock_user_wallet(uow.as_mut(), payout.user_id, now).await?;
        wallet.held_amount = (wallet.held_amount - payout.amount).max(0);
        wallet.updated_at = now;
        uow.save_wallet(&wallet).await?;
        self.ledger
            .outbox()
            .emit(
                uow.as_mut(),
                Channel::WalletUpdate,
                &wallet.to_update_payload(None, now),
                ctx,
            )
            .await?;

        payout.status = PayoutStatus::Rejected;
        payout.rejected_at = Some(now);
        payout.reviewed_by = Some(admin_id);
        payout.review_note = Some(reason.to_string());
        uow.save_payout(&payout).await?;
        uow.commit().await?;
        self.ledger.outbox().committed();

        record_quietly(
            self.ledger.audit(),
            AuditRecord::new("payout.reject", "payout", payout.id, ctx)
                .actor(admin_id)
                .reason(reason),
        )
        .await;
        self.notify(&payout, templates::PAYOUT_REJECTED, ctx).await;
        Ok(payout)
    }

    /// Mark an approved payout completed. Completing twice is a no-op.
    pub async fn complete_payout(
        &self,
        payout_id: Uuid,
        gateway_id: Option<String>,
        ctx: &RequestContext,
    ) -> Result<PayoutRequest, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut payout = lock_payout(uow.as_mut(), payout_id).await?;
        if payout.status == PayoutStatus::Completed {
            return Ok(payout);
        }
        if !payout.status.can_transition_to(PayoutStatus::Completed) {
            return Err(transition_error(&payout, PayoutStatus::Completed));
        }

        let wallet = ledger::lock_user_wallet(uow.as_mut(), payout.user_id, now).await?;
        let debit = uow.entry_by_idempotency_key(&payout.debit_key()).await?;

        payout.status = PayoutStatus::Completed;
        payout.completed_at = Some(now);
        if gateway_id.is_some() {
            payout.gateway_id = gateway_id;
        }
        uow.save_payout(&payout).await?;
        self.ledger
            .outbox()
            .emit(
                uow.as_mut(),
                Channel::WalletUpdate,
                &wallet.to_update_payload(debit.map(|entry| entry.summary()), now),
                ctx,
            )
            .await?;
        uow.commit().await?;
        self.ledger.outbox().committed();

        info!(payout_id = %payout.id, gateway_id = ?payout.gateway_id, "Payout completed");
        self.notify(&payout, templates::PAYOUT_COMPLETED, ctx).await;
        Ok(payout)
    }

    /// Mark an approved payout failed and credit its amount back with a
    /// refund entry keyed by the payout id. Failing twice is a no-op.
    pub async fn fail_and_compensate(
        &self,
        payout_id: Uuid,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<PayoutRequest, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut payout = lock_payout(uow.as_mut(), payout_id).await?;
        if payout.status == PayoutStatus::Failed {
            return Ok(payout);
        }
        if !payout.status.can_transition_to(PayoutStatus::Failed) {
            return Err(transition_error(&payout, PayoutStatus::Failed));
        }

        let mut wallet = ledger::lock_user_wallet(uow.as_mut(), payout.user_id, now).await?;
        let key = payout.compensation_key();
        if LedgerEngine::replayed(uow.as_mut(), Some(&key), wallet.id, EntryKind::Refund)
            .await?
            .is_none()
        {
            let posting = Posting::new(EntryKind::Refund, payout.amount, format!("Payout failed: {reason}"))
                .ref_id(Some(payout.id.to_string()))
                .idempotency_key(Some(key))
                .metadata(serde_json::json!({ "payout_id": payout.id }));
            self.ledger
                .post(uow.as_mut(), &mut wallet, posting, ctx, now)
                .await?;
        }

        payout.status = PayoutStatus::Failed;
        payout.failed_at = Some(now);
        payout.failure_reason = Some(reason.to_string());
        uow.save_payout(&payout).await?;
        uow.commit().await?;
        self.ledger.outbox().committed();

        warn!(payout_id = %payout.id, reason, "Payout failed, amount refunded");
        record_quietly(
            self.ledger.audit(),
            AuditRecord::new("payout.compensate", "payout", payout.id, ctx)
                .reason(reason)
                .metadata(serde_json::json!({ "amount": payout.amount })),
        )
        .await;
        self.notify(&payout, templates::PAYOUT_FAILED, ctx).await;
        Ok(payout)
    }

    /// Settle one `approved` payout against the gateway's view of it.
    pub async fn reconcile(
        &self,
        payout: &PayoutRequest,
        now: OffsetDateTime,
        ctx: &RequestContext,
    ) -> Result<ReconcileOutcome, LedgerError> {
        let reference = payout.gateway_reference();
        let checked = tokio::time::timeout(
            self.config.gateway_timeout,
            self.gateway.check_status(&reference),
        )
        .await;

        let status = match checked {
            Ok(Ok(status)) => status,
            Ok(Err(GatewayError::UnknownPayout(_))) => {
                self.fail_and_compensate(payout.id, "gateway has no record of the payout", ctx)
                    .await?;
                return Ok(ReconcileOutcome::Compensated);
            }
            Ok(Err(e)) => {
                warn!(payout_id = %payout.id, error = %e, "Payout status check failed");
                return Ok(ReconcileOutcome::Deferred);
            }
            Err(_) => {
                warn!(payout_id = %payout.id, "Payout status check timed out");
                return Ok(ReconcileOutcome::Deferred);
            }
        };

        match status {
            GatewayPayoutStatus::Completed { gateway_id } => {
                self.complete_payout(payout.id, gateway_id, ctx).await?;
                Ok(ReconcileOutcome::Completed)
            }
            GatewayPayoutStatus::Failed { reason } => {
                let reason = reason.unwrap_or_else(|| "reported failed by gateway".to_string());
                self.fail_and_compensate(payout.id, &reason, ctx).await?;
                Ok(ReconcileOutcome::Compensated)
            }
            GatewayPayoutStatus::Pending => {
                let abandon_after = time::Duration::try_from(self.config.abandon_after)
                    .unwrap_or(time::Duration::MAX);
                let abandoned = payout
                    .approved_at
                    .is_some_and(|at| now - at >= abandon_after);
                if abandoned {
                    self.fail_and_compensate(payout.id, "abandoned: still pending at gateway", ctx)
                        .await?;
                    Ok(ReconcileOutcome::Compensated)
                } else {
                    Ok(ReconcileOutcome::StillPending)
                }
            }
        }
    }

    /// Approved payouts old enough for reconciliation at `now`.
    pub async fn reconcilable(&self, now: OffsetDateTime) -> Result<Vec<PayoutRequest>, LedgerError> {
        let grace = time::Duration::try_from(self.config.reconciliation_grace)
            .unwrap_or(time::Duration::ZERO);
        Ok(self
            .store
            .approved_payouts_before(now - grace, self.config.reconciliation_batch)
            .await?)
    }

    async fn notify(&self, payout: &PayoutRequest, template: &str, ctx: &RequestContext) {
        let job = NotificationJob::push(
            payout.user_id,
            template,
            serde_json::json!({
                "payout_id": payout.id,
                "amount": payout.amount,
                "status": payout.status.as_str(),
            }),
        )
        .with_priority(NotificationPriority::High);
        enqueue_quietly(self.notifier.as_ref(), job, ctx).await;
    }
}
