//! In-process [`Store`] used by tests and single-node development setups.
//!
//! A unit of work holds the state mutex for its whole lifetime and writes to
//! a private copy, so units are fully serialized and an uncommitted unit
//! leaves no trace. Code holding a unit must not call back into the store's
//! non-transactional reads.

use super::{LedgerSnapshot, OutboxClaim, Store, UnitOfWork};
use crate::entities::{
    LedgerEntry, Listing, ListingStatus, NewLedgerEntry, NewOutboxEvent, OutboxEvent,
    OutboxStatus, PayoutRequest, PayoutStatus, RefundRequest, ReminderWindow, Wallet,
};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemState {
    wallets: HashMap<Uuid, Wallet>,
    entries: Vec<LedgerEntry>,
    entry_seq: i64,
    outbox: Vec<OutboxEvent>,
    outbox_seq: i64,
    payouts: HashMap<Uuid, PayoutRequest>,
    refunds: HashMap<Uuid, RefundRequest>,
    listings: HashMap<Uuid, Listing>,
}

impl MemState {
    fn wallet_by_user(&self, user_id: Uuid) -> Option<&Wallet> {
        self.wallets.values().find(|w| w.user_id == user_id)
    }

    fn outbox_mut(&mut self, event_id: Uuid) -> Option<&mut OutboxEvent> {
        self.outbox.iter_mut().find(|e| e.id == event_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every outbox event ever written, in `seq` order.
    pub async fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.state.lock().await.outbox.clone()
    }

    /// Every ledger entry ever written, in `seq` order.
    pub async fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.entries.clone()
    }
}

struct MemoryUnit {
    guard: OwnedMutexGuard<MemState>,
    work: MemState,
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn lock_wallet(&mut self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        Ok(self.work.wallets.get(&wallet_id).cloned())
    }

    async fn lock_or_create_wallet(
        &mut self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Wallet, StoreError> {
        if let Some(wallet) = self.work.wallet_by_user(user_id) {
            return Ok(wallet.clone());
        }
        let wallet = Wallet::new(user_id, now);
        self.work.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), StoreError> {
        self.work.wallets.insert(wallet.id, wallet.clone());
        Ok(())
    }

    async fn entry_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self
            .work
            .entries
            .iter()
            .find(|e| e.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        if let Some(key) = entry.idempotency_key.as_deref() {
            if self
                .work
                .entries
                .iter()
                .any(|e| e.idempotency_key.as_deref() == Some(key))
            {
                return Err(StoreError::Conflict(format!(
                    "idempotency key {key} already used"
                )));
            }
        }
        self.work.entry_seq += 1;
        let row = LedgerEntry {
            id: Uuid::now_v7(),
            seq: self.work.entry_seq,
            wallet_id: entry.wallet_id,
            kind: entry.kind,
            direction: entry.direction,
            amount: entry.amount,
            balance_after: entry.balance_after,
            description: entry.description,
            gateway: entry.gateway,
            ref_id: entry.ref_id,
            idempotency_key: entry.idempotency_key,
            status: entry.status,
            metadata: entry.metadata,
            created_at: entry.created_at,
        };
        self.work.entries.push(row.clone());
        Ok(row)
    }

    async fn insert_outbox(&mut self, event: NewOutboxEvent) -> Result<OutboxEvent, StoreError> {
        self.work.outbox_seq += 1;
        let row = OutboxEvent {
            id: Uuid::now_v7(),
            seq: self.work.outbox_seq,
            channel: event.channel,
            payload: event.payload,
            request_id: event.request_id,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            claimed_until: None,
            created_at: event.created_at,
            last_attempt_at: None,
            delivered_at: None,
        };
        self.work.outbox.push(row.clone());
        Ok(row)
    }

    async fn insert_payout(&mut self, payout: &PayoutRequest) -> Result<(), StoreError> {
        self.work.payouts.insert(payout.id, payout.clone());
        Ok(())
    }

    async fn lock_payout(&mut self, payout_id: Uuid) -> Result<Option<PayoutRequest>, StoreError> {
        Ok(self.work.payouts.get(&payout_id).cloned())
    }

    async fn save_payout(&mut self, payout: &PayoutRequest) -> Result<(), StoreError> {
        self.work.payouts.insert(payout.id, payout.clone());
        Ok(())
    }

    async fn insert_refund(&mut self, refund: &RefundRequest) -> Result<(), StoreError> {
        self.work.refunds.insert(refund.id, refund.clone());
        Ok(())
    }

    async fn lock_refund(&mut self, refund_id: Uuid) -> Result<Option<RefundRequest>, StoreError> {
        Ok(self.work.refunds.get(&refund_id).cloned())
    }

    async fn save_refund(&mut self, refund: &RefundRequest) -> Result<(), StoreError> {
        self.work.refunds.insert(refund.id, refund.clone());
        Ok(())
    }

    async fn insert_listing(&mut self, listing: &Listing) -> Result<(), StoreError> {
        self.work.listings.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn lock_listing(&mut self, listing_id: Uuid) -> Result<Option<Listing>, StoreError> {
        Ok(self.work.listings.get(&listing_id).cloned())
    }

    async fn save_listing(&mut self, listing: &Listing) -> Result<(), StoreError> {
        self.work.listings.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnit { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryUnit { guard, work }))
    }

    async fn wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        Ok(self.state.lock().await.wallets.get(&wallet_id).cloned())
    }

    async fn wallet_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        Ok(self.state.lock().await.wallet_by_user(user_id).cloned())
    }

    async fn ledger_snapshot(&self, wallet_id: Uuid) -> Result<Option<LedgerSnapshot>, StoreError> {
        let state = self.state.lock().await;
        let Some(wallet) = state.wallets.get(&wallet_id).cloned() else {
            return Ok(None);
        };
        let entries = state
            .entries
            .iter()
            .filter(|e| e.wallet_id == wallet_id)
            .cloned()
            .collect();
        Ok(Some(LedgerSnapshot { wallet, entries }))
    }

    async fn payout(&self, payout_id: Uuid) -> Result<Option<PayoutRequest>, StoreError> {
        Ok(self.state.lock().await.payouts.get(&payout_id).cloned())
    }

    async fn refund(&self, refund_id: Uuid) -> Result<Option<RefundRequest>, StoreError> {
        Ok(self.state.lock().await.refunds.get(&refund_id).cloned())
    }

    async fn listing(&self, listing_id: Uuid) -> Result<Option<Listing>, StoreError> {
        Ok(self.state.lock().await.listings.get(&listing_id).cloned())
    }

    async fn approved_payouts_before(
        &self,
        cutoff: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<PayoutRequest>, StoreError> {
        let state = self.state.lock().await;
        let mut payouts: Vec<PayoutRequest> = state
            .payouts
            .values()
            .filter(|p| {
                p.status == PayoutStatus::Approved && p.approved_at.is_some_and(|at| at <= cutoff)
            })
            .cloned()
            .collect();
        payouts.sort_by_key(|p| p.approved_at);
        payouts.truncate(limit.max(0) as usize);
        Ok(payouts)
    }

    async fn listings_needing_reminder(
        &self,
        window: ReminderWindow,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Listing>, StoreError> {
        let state = self.state.lock().await;
        let mut listings: Vec<Listing> = state
            .listings
            .values()
            .filter(|l| l.needs_reminder(window, now))
            .cloned()
            .collect();
        listings.sort_by_key(|l| l.expires_at);
        listings.truncate(limit.max(0) as usize);
        Ok(listings)
    }

    async fn listings_past_due(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.lock().await;
        let mut due: Vec<&Listing> = state
            .listings
            .values()
            .filter(|l| l.status == ListingStatus::Active && l.is_past_due(now))
            .collect();
        due.sort_by_key(|l| l.expires_at);
        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|l| l.id)
            .collect())
    }

    async fn claim_outbox(&self, claim: OutboxClaim) -> Result<Vec<OutboxEvent>, StoreError> {
        let mut state = self.state.lock().await;
        let lease = time::Duration::try_from(claim.lease).unwrap_or(time::Duration::ZERO);
        let mut claimed = Vec::new();
        for event in state.outbox.iter_mut() {
            if claimed.len() >= claim.limit {
                break;
            }
            if event.is_claimable(claim.max_attempts, claim.now) {
                event.claimed_until = Some(claim.now + lease);
                event.last_attempt_at = Some(claim.now);
                claimed.push(event.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_delivered(&self, event_id: Uuid, now: OffsetDateTime) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(event) = state.outbox_mut(event_id) {
            event.status = OutboxStatus::Delivered;
            event.delivered_at = Some(now);
            event.claimed_until = None;
        }
        Ok(())
    }

    async fn record_delivery_failure(
        &self,
        event_id: Uuid,
        error: &str,
        max_attempts: i32,
        now: OffsetDateTime,
    ) -> Result<Option<OutboxEvent>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(event) = state.outbox_mut(event_id) else {
            return Ok(None);
        };
        event.attempts += 1;
        event.last_error = Some(error.to_string());
        event.last_attempt_at = Some(now);
        event.claimed_until = None;
        if event.attempts >= max_attempts {
            event.status = OutboxStatus::Failed;
        }
        Ok(Some(event.clone()))
    }

    async fn outbox_event(&self, event_id: Uuid) -> Result<Option<OutboxEvent>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.outbox.iter().find(|e| e.id == event_id).cloned())
    }

    async fn count_outbox(&self, status: OutboxStatus) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.outbox.iter().filter(|e| e.status == status).count() as u64)
    }
}
