//! Durable store abstraction.
//!
//! Every mutation runs inside a [`UnitOfWork`]: rows are locked for update,
//! balance + ledger row + outbox row are written, then [`UnitOfWork::commit`]
//! publishes them atomically. Dropping a unit without committing discards
//! every write made through it.
//!
//! Lock order is payout/refund/listing first, wallet second. Implementations
//! must not reorder it.

pub mod memory;
pub mod postgres;

use crate::entities::{
    LedgerEntry, Listing, NewLedgerEntry, NewOutboxEvent, OutboxEvent, OutboxStatus,
    PayoutRequest, RefundRequest, ReminderWindow, Wallet,
};
use crate::error::StoreError;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A consistent view of one wallet and its full history.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub wallet: Wallet,
    /// Ordered by `seq`, oldest first.
    pub entries: Vec<LedgerEntry>,
}

/// Parameters for a dispatcher claim.
#[derive(Debug, Clone, Copy)]
pub struct OutboxClaim {
    pub limit: usize,
    pub lease: std::time::Duration,
    pub max_attempts: i32,
    pub now: OffsetDateTime,
}

/// Transactional handle. See the module docs for the commit contract.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn lock_wallet(&mut self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError>;

    /// Lock the user's wallet, creating it first if this is the user's
    /// first financial event.
    async fn lock_or_create_wallet(
        &mut self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Wallet, StoreError>;

    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), StoreError>;

    async fn entry_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    async fn insert_outbox(&mut self, event: NewOutboxEvent) -> Result<OutboxEvent, StoreError>;

    async fn insert_payout(&mut self, payout: &PayoutRequest) -> Result<(), StoreError>;
    async fn lock_payout(&mut self, payout_id: Uuid) -> Result<Option<PayoutRequest>, StoreError>;
    async fn save_payout(&mut self, payout: &PayoutRequest) -> Result<(), StoreError>;

    async fn insert_refund(&mut self, refund: &RefundRequest) -> Result<(), StoreError>;
    async fn lock_refund(&mut self, refund_id: Uuid) -> Result<Option<RefundRequest>, StoreError>;
    async fn save_refund(&mut self, refund: &RefundRequest) -> Result<(), StoreError>;

    async fn insert_listing(&mut self, listing: &Listing) -> Result<(), StoreError>;
    async fn lock_listing(&mut self, listing_id: Uuid) -> Result<Option<Listing>, StoreError>;
    async fn save_listing(&mut self, listing: &Listing) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Entry point to the durable store: opens units of work and serves the
/// non-transactional reads used by the API, the dispatcher and the jobs.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError>;
    async fn wallet_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError>;

    /// Wallet row and its entries read from one snapshot. Does not block writers.
    async fn ledger_snapshot(&self, wallet_id: Uuid) -> Result<Option<LedgerSnapshot>, StoreError>;

    async fn payout(&self, payout_id: Uuid) -> Result<Option<PayoutRequest>, StoreError>;
    async fn refund(&self, refund_id: Uuid) -> Result<Option<RefundRequest>, StoreError>;
    async fn listing(&self, listing_id: Uuid) -> Result<Option<Listing>, StoreError>;

    /// `approved` payouts approved at or before `cutoff`, oldest first.
    async fn approved_payouts_before(
        &self,
        cutoff: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<PayoutRequest>, StoreError>;

    async fn listings_needing_reminder(
        &self,
        window: ReminderWindow,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Listing>, StoreError>;

    /// Ids of active listings whose `expires_at` is at or before `now`.
    async fn listings_past_due(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// Claim-and-mark: lease up to `claim.limit` eligible events, in `seq`
    /// order, so that no other dispatcher can take them until the lease
    /// lapses.
    async fn claim_outbox(&self, claim: OutboxClaim) -> Result<Vec<OutboxEvent>, StoreError>;

    async fn mark_delivered(&self, event_id: Uuid, now: OffsetDateTime) -> Result<(), StoreError>;

    /// Count a failed attempt and release the claim. The event turns
    /// terminally `failed` once `attempts` reaches `max_attempts`.
    async fn record_delivery_failure(
        &self,
        event_id: Uuid,
        error: &str,
        max_attempts: i32,
        now: OffsetDateTime,
    ) -> Result<Option<OutboxEvent>, StoreError>;

    async fn outbox_event(&self, event_id: Uuid) -> Result<Option<OutboxEvent>, StoreError>;

    async fn count_outbox(&self, status: OutboxStatus) -> Result<u64, StoreError>;
}
