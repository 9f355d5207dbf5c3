use super::templates;
use crate::audit::{AuditRecord, record_quietly};
use crate::context::RequestContext;
use crate::entities::{EntryKind, LedgerEntry, RefundRequest, RefundStatus};
use crate::error::LedgerError;
use crate::ledger::{self, LedgerEngine, Posted, Posting, retry_on_conflict};
use crate::notify::{NotificationJob, NotificationSender, enqueue_quietly};
use crate::store::Store;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

/// An admin-issued refund.
#[derive(Debug, Clone)]
pub struct IssueRefund {
    pub user_id: Uuid,
    pub amount: i64,
    pub reason: String,
    pub ref_id: Option<String>,
}

/// A refund asked for by the wallet owner, pending review.
#[derive(Debug, Clone)]
pub struct NewRefund {
    pub amount: i64,
    pub reason: String,
    pub ref_id: Option<String>,
}

#[derive(Clone)]
pub struct RefundWorkflow {
    ledger: LedgerEngine,
    store: Arc<dyn Store>,
    notifier: Arc<dyn NotificationSender>,
}

impl RefundWorkflow {
    pub fn new(
        ledger: LedgerEngine,
        store: Arc<dyn Store>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            ledger,
            store,
            notifier,
        }
    }

    pub async fn refund(&self, refund_id: Uuid) -> Result<RefundRequest, LedgerError> {
        self.store
            .refund(refund_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("refund", refund_id))
    }

    /// Credit `refund.amount` to the user's wallet as a refund entry.
    ///
    /// The idempotency key is mandatory; replaying it returns the original
    /// entry. Refunds are accepted on frozen wallets.
    #[tracing::instrument(skip_all, err, fields(user_id = %refund.user_id, admin_id = %admin_id))]
    pub async fn issue_refund(
        &self,
        refund: IssueRefund,
        admin_id: Uuid,
        idempotency_key: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<Posted<LedgerEntry>, LedgerError> {
        let key = idempotency_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(LedgerError::IdempotencyKeyRequired)?
            .to_string();
        if refund.amount <= 0 {
            return Err(LedgerError::InvalidAmount(refund.amount));
        }

        let posted = retry_on_conflict(|| self.issue_once(&refund, admin_id, &key, ctx)).await?;
        if !posted.replayed {
            record_quietly(
                self.ledger.audit(),
                AuditRecord::new("refund.issue", "wallet", posted.value.wallet_id, ctx)
                    .actor(admin_id)
                    .reason(refund.reason.as_str())
                    .metadata(serde_json::json!({
                        "amount": refund.amount,
                        "entry_id": posted.value.id,
                        "idempotency_key": key,
                    })),
            )
            .await;
        }
        Ok(posted)
    }

    async fn issue_once(
        &self,
        refund: &IssueRefund,
        admin_id: Uuid,
        key: &str,
        ctx: &RequestContext,
    ) -> Result<Posted<LedgerEntry>, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut wallet = ledger::lock_user_wallet(uow.as_mut(), refund.user_id, now).await?;
        let key = ledger::caller_key("refund", key);
        if let Some(existing) =
            LedgerEngine::replayed(uow.as_mut(), Some(&key), wallet.id, EntryKind::Refund).await?
        {
            return Ok(Posted {
                value: existing,
                replayed: true,
            });
        }

        let posting = Posting::new(EntryKind::Refund, refund.amount, refund.reason.as_str())
            .ref_id(refund.ref_id.clone())
            .idempotency_key(Some(key))
            .metadata(serde_json::json!({ "admin_id": admin_id }));
        let entry = self
            .ledger
            .post(uow.as_mut(), &mut wallet, posting, ctx, now)
            .await?;
        uow.commit().await?;
        self.ledger.outbox().committed();

        info!(entry_id = %entry.id, amount = entry.amount, "Refund issued");
        Ok(Posted {
            value: entry,
            replayed: false,
        })
    }

    pub async fn request_refund(
        &self,
        user_id: Uuid,
        request: NewRefund,
    ) -> Result<RefundRequest, LedgerError> {
        if request.amount <= 0 {
            return Err(LedgerError::InvalidAmount(request.amount));
        }
        let refund = RefundRequest {
            id: Uuid::now_v7(),
            user_id,
            amount: request.amount,
            reason: request.reason,
            ref_id: request.ref_id,
            status: RefundStatus::Pending,
            ledger_entry_id: None,
            reviewed_by: None,
            review_note: None,
            created_at: OffsetDateTime::now_utc(),
            reviewed_at: None,
        };
        let mut uow = self.store.begin().await?;
        uow.insert_refund(&refund).await?;
        uow.commit().await?;
        info!(refund_id = %refund.id, %user_id, "Refund requested");
        Ok(refund)
    }

    /// Approve a pending refund request, crediting it under the key
    /// `refund:<id>`.
    #[tracing::instrument(skip_all, err, fields(refund_id = %refund_id, admin_id = %admin_id))]
    pub async fn approve_refund(
        &self,
        refund_id: Uuid,
        admin_id: Uuid,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<RefundRequest, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut refund = uow
            .lock_refund(refund_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("refund", refund_id))?;
        if refund.status != RefundStatus::Pending {
            return Err(LedgerError::InvalidTransition {
                entity: "refund",
                id: refund.id,
                from: refund.status.as_str(),
                to: RefundStatus::Approved.as_str(),
            });
        }

        let mut wallet = ledger::lock_user_wallet(uow.as_mut(), refund.user_id, now).await?;
        let key = refund.idempotency_key();
        let entry = match LedgerEngine::replayed(uow.as_mut(), Some(&key), wallet.id, EntryKind::Refund)
            .await?
        {
            Some(existing) => existing,
            None => {
                let posting = Posting::new(EntryKind::Refund, refund.amount, refund.reason.as_str())
                    .ref_id(refund.ref_id.clone().or_else(|| Some(refund.id.to_string())))
                    .idempotency_key(Some(key))
                    .metadata(serde_json::json!({ "refund_id": refund.id, "admin_id": admin_id }));
                self.ledger
                    .post(uow.as_mut(), &mut wallet, posting, ctx, now)
                    .await?
            }
        };

        refund.status = RefundStatus::Approved;
        refund.ledger_entry_id = Some(entry.id);
        refund.reviewed_by = Some(admin_id);
        refund.review_note = Some(reason.to_string());
        refund.reviewed_at = Some(now);
        uow.save_refund(&refund).await?;
        uow.commit().await?;
        self.ledger.outbox().committed();

        record_quietly(
            self.ledger.audit(),
            AuditRecord::new("refund.approve", "refund", refund.id, ctx)
                .actor(admin_id)
                .reason(reason)
                .metadata(serde_json::json!({ "amount": refund.amount, "entry_id": entry.id })),
        )
        .await;
        self.notify(&refund, templates::REFUND_APPROVED, ctx).await;
        Ok(refund)
    }

    #[tracing::instrument(skip_all, err, fields(refund_id = %refund_id, admin_id = %admin_id))]
    pub async fn reject_refund(
        &self,
        refund_id: Uuid,
        admin_id: Uuid,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<RefundRequest, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut refund = uow
            .lock_refund(refund_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("refund", refund_id))?;
        if refund.status != RefundStatus::Pending {
            return Err(LedgerError::InvalidTransition {
                entity: "refund",
                id: refund.id,
                from: refund.status.as_str(),
                to: RefundStatus::Rejected.as_str(),
            });
        }

        refund.status = RefundStatus::Rejected;
        refund.reviewed_by = Some(admin_id);
        refund.review_note = Some(reason.to_string());
        refund.reviewed_at = Some(now);
        uow.save_refund(&refund).await?;
        uow.commit().await?;

        record_quietly(
            self.ledger.audit(),
            AuditRecord::new("refund.reject", "refund", refund.id, ctx)
                .actor(admin_id)
                .reason(reason),
        )
        .await;
        self.notify(&refund, templates::REFUND_REJECTED, ctx).await;
        Ok(refund)
    }

    async fn notify(&self, refund: &RefundRequest, template: &str, ctx: &RequestContext) {
        let job = NotificationJob::push(
            refund.user_id,
            template,
            serde_json::json!({
                "refund_id": refund.id,
                "amount": refund.amount,
                "status": refund.status.as_str(),
            }),
        );
        enqueue_quietly(self.notifier.as_ref(), job, ctx).await;
    }
}
