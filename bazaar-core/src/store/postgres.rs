use super::{LedgerSnapshot, OutboxClaim, Store, UnitOfWork};
use crate::entities::{
    LedgerEntry, Listing, NewLedgerEntry, NewOutboxEvent, OutboxEvent, OutboxStatus,
    PayoutRequest, RefundRequest, ReminderWindow, Wallet,
};
use crate::error::StoreError;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

/// Postgres-backed [`Store`]. Row locks are taken with `SELECT ... FOR UPDATE`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    #[tracing::instrument(skip_all, err, name = "SQL:LockWallet")]
    async fn lock_wallet(&mut self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1 FOR UPDATE")
            .bind(wallet_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(wallet)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:LockOrCreateWallet")]
    async fn lock_or_create_wallet(
        &mut self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Wallet, StoreError> {
        let fresh = Wallet::new(user_id, now);
        sqlx::query(
            r#"
            INSERT INTO wallets (id, user_id, balance, held_amount, status, created_at, updated_at)
            VALUES ($1, $2, 0, 0, 'active', $3, $3)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(fresh.id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        let wallet =
            sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(wallet)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:SaveWallet")]
    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $2, held_amount = $3, status = $4,
                freeze_reason = $5, freeze_expiry = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.balance)
        .bind(wallet.held_amount)
        .bind(wallet.status)
        .bind(&wallet.freeze_reason)
        .bind(wallet.freeze_expiry)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetEntryByIdempotencyKey")]
    async fn entry_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM ledger_entries WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(entry)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertLedgerEntry")]
    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let row = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger_entries
                (id, wallet_id, kind, direction, amount, balance_after, description,
                 gateway, ref_id, idempotency_key, status, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(entry.wallet_id)
        .bind(entry.kind)
        .bind(entry.direction)
        .bind(entry.amount)
        .bind(entry.balance_after)
        .bind(entry.description)
        .bind(entry.gateway)
        .bind(entry.ref_id)
        .bind(entry.idempotency_key)
        .bind(entry.status)
        .bind(Json(entry.metadata))
        .bind(entry.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertOutboxEvent")]
    async fn insert_outbox(&mut self, event: NewOutboxEvent) -> Result<OutboxEvent, StoreError> {
        let row = sqlx::query_as::<_, OutboxEvent>(
            r#"
            INSERT INTO outbox_events (id, channel, payload, request_id, status, attempts, created_at)
            VALUES ($1, $2, $3, $4, 'pending', 0, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(event.channel)
        .bind(Json(event.payload))
        .bind(event.request_id)
        .bind(event.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertPayoutRequest")]
    async fn insert_payout(&mut self, payout: &PayoutRequest) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payout_requests
                (id, user_id, amount, method, bank_details, status, fraud_score, trust_score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payout.id)
        .bind(payout.user_id)
        .bind(payout.amount)
        .bind(&payout.method)
        .bind(Json(&payout.bank_details))
        .bind(payout.status)
        .bind(payout.fraud_score)
        .bind(payout.trust_score)
        .bind(payout.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:LockPayoutRequest")]
    async fn lock_payout(&mut self, payout_id: Uuid) -> Result<Option<PayoutRequest>, StoreError> {
        let payout = sqlx::query_as::<_, PayoutRequest>(
            "SELECT * FROM payout_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(payout_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(payout)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:SavePayoutRequest")]
    async fn save_payout(&mut self, payout: &PayoutRequest) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE payout_requests
            SET status = $2, gateway_id = $3, reviewed_by = $4, review_note = $5,
                failure_reason = $6, approved_at = $7, rejected_at = $8,
                completed_at = $9, failed_at = $10
            WHERE id = $1
            "#,
        )
        .bind(payout.id)
        .bind(payout.status)
        .bind(&payout.gateway_id)
        .bind(payout.reviewed_by)
        .bind(&payout.review_note)
        .bind(&payout.failure_reason)
        .bind(payout.approved_at)
        .bind(payout.rejected_at)
        .bind(payout.completed_at)
        .bind(payout.failed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertRefundRequest")]
    async fn insert_refund(&mut self, refund: &RefundRequest) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refund_requests (id, user_id, amount, reason, ref_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(refund.id)
        .bind(refund.user_id)
        .bind(refund.amount)
        .bind(&refund.reason)
        .bind(&refund.ref_id)
        .bind(refund.status)
        .bind(refund.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:LockRefundRequest")]
    async fn lock_refund(&mut self, refund_id: Uuid) -> Result<Option<RefundRequest>, StoreError> {
        let refund = sqlx::query_as::<_, RefundRequest>(
            "SELECT * FROM refund_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(refund_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(refund)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:SaveRefundRequest")]
    async fn save_refund(&mut self, refund: &RefundRequest) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE refund_requests
            SET status = $2, ledger_entry_id = $3, reviewed_by = $4,
                review_note = $5, reviewed_at = $6
            WHERE id = $1
            "#,
        )
        .bind(refund.id)
        .bind(refund.status)
        .bind(refund.ledger_entry_id)
        .bind(refund.reviewed_by)
        .bind(&refund.review_note)
        .bind(refund.reviewed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertListing")]
    async fn insert_listing(&mut self, listing: &Listing) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO listings
                (id, seller_id, title, status, expires_at, reminder_sent_3d, reminder_sent_1d,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(listing.id)
        .bind(listing.seller_id)
        .bind(&listing.title)
        .bind(listing.status)
        .bind(listing.expires_at)
        .bind(listing.reminder_sent_3d)
        .bind(listing.reminder_sent_1d)
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:LockListing")]
    async fn lock_listing(&mut self, listing_id: Uuid) -> Result<Option<Listing>, StoreError> {
        let listing =
            sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = $1 FOR UPDATE")
                .bind(listing_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(listing)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:SaveListing")]
    async fn save_listing(&mut self, listing: &Listing) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE listings
            SET title = $2, status = $3, expires_at = $4, reminder_sent_3d = $5,
                reminder_sent_1d = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(listing.id)
        .bind(&listing.title)
        .bind(listing.status)
        .bind(listing.expires_at)
        .bind(listing.reminder_sent_3d)
        .bind(listing.reminder_sent_1d)
        .bind(listing.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetWallet")]
    async fn wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1")
            .bind(wallet_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(wallet)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetWalletByUser")]
    async fn wallet_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(wallet)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetLedgerSnapshot")]
    async fn ledger_snapshot(&self, wallet_id: Uuid) -> Result<Option<LedgerSnapshot>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let Some(wallet) = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1")
            .bind(wallet_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let entries = sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM ledger_entries WHERE wallet_id = $1 ORDER BY seq",
        )
        .bind(wallet_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(LedgerSnapshot { wallet, entries }))
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetPayoutRequest")]
    async fn payout(&self, payout_id: Uuid) -> Result<Option<PayoutRequest>, StoreError> {
        let payout =
            sqlx::query_as::<_, PayoutRequest>("SELECT * FROM payout_requests WHERE id = $1")
                .bind(payout_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(payout)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetRefundRequest")]
    async fn refund(&self, refund_id: Uuid) -> Result<Option<RefundRequest>, StoreError> {
        let refund =
            sqlx::query_as::<_, RefundRequest>("SELECT * FROM refund_requests WHERE id = $1")
                .bind(refund_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(refund)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetListing")]
    async fn listing(&self, listing_id: Uuid) -> Result<Option<Listing>, StoreError> {
        let listing = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = $1")
            .bind(listing_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(listing)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetApprovedPayoutsBefore")]
    async fn approved_payouts_before(
        &self,
        cutoff: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<PayoutRequest>, StoreError> {
        let payouts = sqlx::query_as::<_, PayoutRequest>(
            r#"
            SELECT * FROM payout_requests
            WHERE status = 'approved' AND approved_at <= $1
            ORDER BY approved_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(payouts)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetListingsNeedingReminder")]
    async fn listings_needing_reminder(
        &self,
        window: ReminderWindow,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Listing>, StoreError> {
        let flag = match window {
            ReminderWindow::ThreeDays => "reminder_sent_3d",
            ReminderWindow::OneHour => "reminder_sent_1d",
        };
        let sql = format!(
            r#"
            SELECT * FROM listings
            WHERE status = 'active' AND NOT {flag}
              AND expires_at > $1 AND expires_at <= $2
            ORDER BY expires_at ASC
            LIMIT $3
            "#
        );
        let listings = sqlx::query_as::<_, Listing>(&sql)
            .bind(now)
            .bind(now + window.lead())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(listings)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetListingsPastDue")]
    async fn listings_past_due(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM listings
            WHERE status = 'active' AND expires_at <= $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:ClaimOutboxEvents")]
    async fn claim_outbox(&self, claim: OutboxClaim) -> Result<Vec<OutboxEvent>, StoreError> {
        let lease = time::Duration::try_from(claim.lease).unwrap_or(time::Duration::ZERO);
        let mut events = sqlx::query_as::<_, OutboxEvent>(
            r#"
            UPDATE outbox_events
            SET claimed_until = $1, last_attempt_at = $2
            WHERE id IN (
                SELECT id FROM outbox_events
                WHERE (status = 'pending' OR (status = 'failed' AND attempts < $3))
                  AND (claimed_until IS NULL OR claimed_until <= $2)
                ORDER BY seq ASC
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(claim.now + lease)
        .bind(claim.now)
        .bind(claim.max_attempts)
        .bind(claim.limit as i64)
        .fetch_all(&self.pool)
        .await?;
        events.sort_by_key(|e| e.seq);
        Ok(events)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:MarkOutboxDelivered")]
    async fn mark_delivered(&self, event_id: Uuid, now: OffsetDateTime) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'delivered', delivered_at = $2, claimed_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:RecordOutboxFailure")]
    async fn record_delivery_failure(
        &self,
        event_id: Uuid,
        error: &str,
        max_attempts: i32,
        now: OffsetDateTime,
    ) -> Result<Option<OutboxEvent>, StoreError> {
        let event = sqlx::query_as::<_, OutboxEvent>(
            r#"
            UPDATE outbox_events
            SET attempts = attempts + 1,
                last_error = $2,
                last_attempt_at = $4,
                claimed_until = NULL,
                status = CASE WHEN attempts + 1 >= $3 THEN 'failed'::outbox_status ELSE status END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(error)
        .bind(max_attempts)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetOutboxEvent")]
    async fn outbox_event(&self, event_id: Uuid) -> Result<Option<OutboxEvent>, StoreError> {
        let event = sqlx::query_as::<_, OutboxEvent>("SELECT * FROM outbox_events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:CountOutboxEvents")]
    async fn count_outbox(&self, status: OutboxStatus) -> Result<u64, StoreError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM outbox_events WHERE status = $1")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }
}
