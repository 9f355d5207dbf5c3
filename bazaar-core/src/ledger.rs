//! Wallet ledger engine.
//!
//! Every balance change is one immutable [`LedgerEntry`] plus one
//! `wallet.update` outbox event, written together with the new balance in a
//! single unit of work under the wallet's row lock. An idempotency key that
//! was already applied returns the original entry with
//! [`Posted::replayed`] set and changes nothing.

use crate::audit::{AuditRecord, AuditSink, record_quietly};
use crate::context::RequestContext;
use crate::entities::{
    Channel, EntryDirection, EntryKind, EntryStatus, LedgerEntry, NewLedgerEntry, Wallet,
    WalletStatus,
};
use crate::error::LedgerError;
use crate::outbox::EventOutbox;
use crate::store::{Store, UnitOfWork};
use std::future::Future;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Gateway name recorded on entries that originate inside the marketplace.
pub const INTERNAL_GATEWAY: &str = "internal";

/// Storage form of a caller-supplied idempotency key.
///
/// Keys derived from payout and refund ids are stored bare, so caller keys
/// get a `caller:<operation>:` prefix and can never collide with them.
pub fn caller_key(operation: &str, key: &str) -> String {
    format!("caller:{operation}:{key}")
}

/// Result of an idempotent posting.
#[derive(Debug, Clone, PartialEq)]
pub struct Posted<T> {
    pub value: T,
    /// The idempotency key had already been applied; `value` is the
    /// original result and nothing was written.
    pub replayed: bool,
}

impl<T> Posted<T> {
    fn fresh(value: T) -> Self {
        Self {
            value,
            replayed: false,
        }
    }

    fn replay(value: T) -> Self {
        Self {
            value,
            replayed: true,
        }
    }
}

/// One balance movement to record.
#[derive(Debug, Clone)]
pub struct Posting {
    pub kind: EntryKind,
    pub direction: EntryDirection,
    pub amount: i64,
    pub description: String,
    pub gateway: String,
    pub ref_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub metadata: serde_json::Value,
}

impl Posting {
    /// A posting whose direction follows from `kind`.
    pub fn new(kind: EntryKind, amount: i64, description: impl Into<String>) -> Self {
        Self {
            kind,
            direction: kind.implied_direction().unwrap_or(EntryDirection::In),
            amount,
            description: description.into(),
            gateway: INTERNAL_GATEWAY.to_string(),
            ref_id: None,
            idempotency_key: None,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into();
        self
    }

    pub fn ref_id(mut self, ref_id: Option<String>) -> Self {
        self.ref_id = ref_id;
        self
    }

    pub fn idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Filters for [`LedgerEngine::get_ledger`].
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub kind: Option<EntryKind>,
    pub status: Option<EntryStatus>,
    /// Inclusive.
    pub from: Option<OffsetDateTime>,
    /// Exclusive.
    pub to: Option<OffsetDateTime>,
}

impl LedgerFilter {
    fn matches(&self, entry: &LedgerEntry) -> bool {
        self.kind.is_none_or(|k| entry.kind == k)
            && self.status.is_none_or(|s| entry.status == s)
            && self.from.is_none_or(|from| entry.created_at >= from)
            && self.to.is_none_or(|to| entry.created_at < to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

/// A page of a wallet's history, newest first.
#[derive(Debug, Clone)]
pub struct LedgerPage {
    pub wallet: Wallet,
    /// Each entry with the wallet balance right after it.
    pub entries: Vec<(LedgerEntry, i64)>,
    /// Entries matching the filter, across all pages.
    pub total: usize,
    /// Whether folding every entry reproduces the stored balance.
    pub consistent: bool,
}

/// Balance after each entry, folded forward from zero. `entries` must be in
/// `seq` order.
pub fn running_balances(entries: &[LedgerEntry]) -> Vec<i64> {
    entries
        .iter()
        .scan(0i64, |balance, entry| {
            *balance += entry.signed_amount();
            Some(*balance)
        })
        .collect()
}

/// Run `op`, and once more if it lost a race on a unique idempotency key.
/// The second run finds the winner's entry and reports a replay.
pub(crate) async fn retry_on_conflict<T, F, Fut>(mut op: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    match op().await {
        Err(e) if e.is_conflict() => {
            debug!(error = %e, "Write conflict, retrying once");
            op().await
        }
        other => other,
    }
}

/// Lock a wallet and lift its freeze if the freeze has lapsed.
pub(crate) async fn lock_wallet(
    uow: &mut dyn UnitOfWork,
    wallet_id: Uuid,
    now: OffsetDateTime,
) -> Result<Wallet, LedgerError> {
    let mut wallet = uow
        .lock_wallet(wallet_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("wallet", wallet_id))?;
    if wallet.lift_lapsed_freeze(now) {
        info!(wallet_id = %wallet.id, "Lapsed wallet freeze lifted");
    }
    Ok(wallet)
}

/// Lock (creating if needed) a user's wallet and lift a lapsed freeze.
pub(crate) async fn lock_user_wallet(
    uow: &mut dyn UnitOfWork,
    user_id: Uuid,
    now: OffsetDateTime,
) -> Result<Wallet, LedgerError> {
    let mut wallet = uow.lock_or_create_wallet(user_id, now).await?;
    if wallet.lift_lapsed_freeze(now) {
        info!(wallet_id = %wallet.id, "Lapsed wallet freeze lifted");
    }
    Ok(wallet)
}

pub(crate) fn ensure_not_frozen(wallet: &Wallet, now: OffsetDateTime) -> Result<(), LedgerError> {
    if wallet.is_frozen_at(now) {
        Err(LedgerError::WalletFrozen(wallet.id))
    } else {
        Ok(())
    }
}

#[derive(Clone)]
pub struct LedgerEngine {
    store: Arc<dyn Store>,
    outbox: EventOutbox,
    audit: Arc<dyn AuditSink>,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn Store>, outbox: EventOutbox, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            outbox,
            audit,
        }
    }

    /// Record `posting` against the locked `wallet` inside `uow`: checks
    /// funds, appends the entry, saves the new balance and emits
    /// `wallet.update`. Freeze policy is the caller's concern.
    pub(crate) async fn post(
        &self,
        uow: &mut dyn UnitOfWork,
        wallet: &mut Wallet,
        posting: Posting,
        ctx: &RequestContext,
        now: OffsetDateTime,
    ) -> Result<LedgerEntry, LedgerError> {
        if posting.amount <= 0 {
            return Err(LedgerError::InvalidAmount(posting.amount));
        }
        let balance_after = match posting.direction {
            EntryDirection::In => {
                wallet
                    .balance
                    .checked_add(posting.amount)
                    .ok_or(LedgerError::OutOfRange {
                        field: "amount",
                        value: posting.amount,
                    })?
            }
            EntryDirection::Out => {
                if wallet.balance < posting.amount {
                    return Err(LedgerError::InsufficientFunds {
                        available: wallet.balance,
                        requested: posting.amount,
                    });
                }
                wallet.balance - posting.amount
            }
        };

        let entry = uow
            .insert_entry(NewLedgerEntry {
                wallet_id: wallet.id,
                kind: posting.kind,
                direction: posting.direction,
                amount: posting.amount,
                balance_after,
                description: posting.description,
                gateway: posting.gateway,
                ref_id: posting.ref_id,
                idempotency_key: posting.idempotency_key,
                status: EntryStatus::Success,
                metadata: posting.metadata,
                created_at: now,
            })
            .await?;

        wallet.balance = balance_after;
        wallet.updated_at = now;
        uow.save_wallet(wallet).await?;

        let payload = wallet.to_update_payload(Some(entry.summary()), now);
        self.outbox
            .emit(uow, Channel::WalletUpdate, &payload, ctx)
            .await?;
        Ok(entry)
    }

    /// Look up an already-applied idempotency key. An entry under the key
    /// that belongs to another wallet or kind is refused, never replayed.
    pub(crate) async fn replayed(
        uow: &mut dyn UnitOfWork,
        key: Option<&str>,
        wallet_id: Uuid,
        kind: EntryKind,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let Some(key) = key else {
            return Ok(None);
        };
        match uow.entry_by_idempotency_key(key).await? {
            Some(entry) if entry.wallet_id != wallet_id || entry.kind != kind => {
                warn!(
                    key,
                    %wallet_id,
                    owner_wallet_id = %entry.wallet_id,
                    "Idempotency key reused across operations"
                );
                Err(LedgerError::IdempotencyKeyReused {
                    key: key.to_string(),
                })
            }
            found => Ok(found),
        }
    }

    pub(crate) fn outbox(&self) -> &EventOutbox {
        &self.outbox
    }

    pub(crate) fn audit(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }

    async fn post_to_wallet(
        &self,
        wallet_id: Uuid,
        posting: Posting,
        block_when_frozen: bool,
        ctx: &RequestContext,
    ) -> Result<Posted<LedgerEntry>, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut wallet = lock_wallet(uow.as_mut(), wallet_id, now).await?;

        if let Some(existing) = Self::replayed(
            uow.as_mut(),
            posting.idempotency_key.as_deref(),
            wallet.id,
            posting.kind,
        )
        .await?
        {
            return Ok(Posted::replay(existing));
        }
        if block_when_frozen {
            ensure_not_frozen(&wallet, now)?;
        }

        let entry = self.post(uow.as_mut(), &mut wallet, posting, ctx, now).await?;
        uow.commit().await?;
        self.outbox.committed();
        Ok(Posted::fresh(entry))
    }

    /// Add funds. Allowed on frozen wallets.
    #[tracing::instrument(skip_all, err, fields(wallet_id = %wallet_id, amount = posting.amount))]
    pub async fn credit(
        &self,
        wallet_id: Uuid,
        posting: Posting,
        ctx: &RequestContext,
    ) -> Result<Posted<LedgerEntry>, LedgerError> {
        let posting = Posting {
            direction: EntryDirection::In,
            idempotency_key: posting
                .idempotency_key
                .map(|key| caller_key("credit", &key)),
            ..posting
        };
        retry_on_conflict(move || self.post_to_wallet(wallet_id, posting.clone(), false, ctx)).await
    }

    /// Remove funds. Fails without effect when the balance is short or the
    /// wallet is frozen.
    #[tracing::instrument(skip_all, err, fields(wallet_id = %wallet_id, amount = posting.amount))]
    pub async fn debit(
        &self,
        wallet_id: Uuid,
        posting: Posting,
        ctx: &RequestContext,
    ) -> Result<Posted<LedgerEntry>, LedgerError> {
        let posting = Posting {
            direction: EntryDirection::Out,
            idempotency_key: posting
                .idempotency_key
                .map(|key| caller_key("debit", &key)),
            ..posting
        };
        retry_on_conflict(move || self.post_to_wallet(wallet_id, posting.clone(), true, ctx)).await
    }

    /// Signed manual correction. A negative amount may not overdraw.
    #[tracing::instrument(skip_all, err, fields(wallet_id = %wallet_id, signed_amount = signed_amount, admin_id = %admin_id))]
    pub async fn adjust_by_admin(
        &self,
        wallet_id: Uuid,
        signed_amount: i64,
        reason: &str,
        admin_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<LedgerEntry, LedgerError> {
        if signed_amount == 0 {
            return Err(LedgerError::InvalidAmount(signed_amount));
        }
        let amount = signed_amount.checked_abs().ok_or(LedgerError::OutOfRange {
            field: "amount",
            value: signed_amount,
        })?;
        let direction = if signed_amount > 0 {
            EntryDirection::In
        } else {
            EntryDirection::Out
        };
        let posting = Posting {
            direction,
            ..Posting::new(EntryKind::Adjustment, amount, reason)
        }
        .metadata(serde_json::json!({ "admin_id": admin_id }));

        let entry = self
            .post_to_wallet(wallet_id, posting, false, ctx)
            .await?
            .value;

        record_quietly(
            self.audit(),
            AuditRecord::new("wallet.adjust", "wallet", wallet_id, ctx)
                .actor(admin_id)
                .reason(reason)
                .metadata(serde_json::json!({
                    "amount": signed_amount,
                    "entry_id": entry.id,
                    "balance_after": entry.balance_after,
                })),
        )
        .await;
        Ok(entry)
    }

    /// Freeze until `expiry`, or until lifted when `expiry` is `None`.
    #[tracing::instrument(skip_all, err, fields(wallet_id = %wallet_id, admin_id = %admin_id))]
    pub async fn freeze(
        &self,
        wallet_id: Uuid,
        reason: &str,
        expiry: Option<OffsetDateTime>,
        admin_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<Wallet, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut wallet = lock_wallet(uow.as_mut(), wallet_id, now).await?;
        self.freeze_locked(uow.as_mut(), &mut wallet, reason, expiry, ctx, now)
            .await?;
        uow.commit().await?;
        self.outbox.committed();

        record_quietly(
            self.audit(),
            AuditRecord::new("wallet.freeze", "wallet", wallet_id, ctx)
                .actor(admin_id)
                .reason(reason)
                .metadata(serde_json::json!({
                    "expires_at": expiry.map(|e| e.unix_timestamp()),
                })),
        )
        .await;
        Ok(wallet)
    }

    pub(crate) async fn freeze_locked(
        &self,
        uow: &mut dyn UnitOfWork,
        wallet: &mut Wallet,
        reason: &str,
        expiry: Option<OffsetDateTime>,
        ctx: &RequestContext,
        now: OffsetDateTime,
    ) -> Result<(), LedgerError> {
        wallet.status = WalletStatus::Frozen;
        wallet.freeze_reason = Some(reason.to_string());
        wallet.freeze_expiry = expiry;
        wallet.updated_at = now;
        uow.save_wallet(wallet).await?;
        self.outbox
            .emit(uow, Channel::WalletUpdate, &wallet.to_update_payload(None, now), ctx)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, fields(wallet_id = %wallet_id, admin_id = %admin_id))]
    pub async fn unfreeze(
        &self,
        wallet_id: Uuid,
        reason: &str,
        admin_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<Wallet, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut wallet = lock_wallet(uow.as_mut(), wallet_id, now).await?;
        wallet.status = WalletStatus::Active;
        wallet.freeze_reason = None;
        wallet.freeze_expiry = None;
        wallet.updated_at = now;
        uow.save_wallet(&wallet).await?;
        self.outbox
            .emit(
                uow.as_mut(),
                Channel::WalletUpdate,
                &wallet.to_update_payload(None, now),
                ctx,
            )
            .await?;
        uow.commit().await?;
        self.outbox.committed();

        record_quietly(
            self.audit(),
            AuditRecord::new("wallet.unfreeze", "wallet", wallet_id, ctx)
                .actor(admin_id)
                .reason(reason),
        )
        .await;
        Ok(wallet)
    }

    /// The user's wallet, created on first use.
    pub async fn ensure_wallet(&self, user_id: Uuid) -> Result<Wallet, LedgerError> {
        if let Some(wallet) = self.store.wallet_by_user(user_id).await? {
            return Ok(wallet);
        }
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let wallet = uow.lock_or_create_wallet(user_id, now).await?;
        uow.commit().await?;
        Ok(wallet)
    }

    pub async fn wallet_for_user(&self, user_id: Uuid) -> Result<Option<Wallet>, LedgerError> {
        Ok(self.store.wallet_by_user(user_id).await?)
    }

    pub async fn wallet(&self, wallet_id: Uuid) -> Result<Wallet, LedgerError> {
        self.store
            .wallet(wallet_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("wallet", wallet_id))
    }

    /// Snapshot read of a wallet's history with per-entry running balances.
    pub async fn get_ledger(
        &self,
        wallet_id: Uuid,
        filter: &LedgerFilter,
        page: Page,
    ) -> Result<LedgerPage, LedgerError> {
        let snapshot = self
            .store
            .ledger_snapshot(wallet_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("wallet", wallet_id))?;

        let balances = running_balances(&snapshot.entries);
        let folded = balances.last().copied().unwrap_or(0);
        let consistent = folded == snapshot.wallet.balance;
        if !consistent {
            tracing::error!(
                %wallet_id,
                stored = snapshot.wallet.balance,
                folded,
                "Wallet balance does not match its ledger"
            );
        }

        let mut matching: Vec<(LedgerEntry, i64)> = snapshot
            .entries
            .into_iter()
            .zip(balances)
            .filter(|(entry, _)| filter.matches(entry))
            .collect();
        let total = matching.len();
        matching.reverse();
        let entries = matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();

        Ok(LedgerPage {
            wallet: snapshot.wallet,
            entries,
            total,
            consistent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(direction: EntryDirection, amount: i64, status: EntryStatus) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::now_v7(),
            seq: 0,
            wallet_id: Uuid::nil(),
            kind: EntryKind::Adjustment,
            direction,
            amount,
            balance_after: 0,
            description: String::new(),
            gateway: INTERNAL_GATEWAY.into(),
            ref_id: None,
            idempotency_key: None,
            status,
            metadata: serde_json::json!({}),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn running_balance_skips_unsuccessful_entries() {
        let entries = vec![
            entry(EntryDirection::In, 500, EntryStatus::Success),
            entry(EntryDirection::Out, 200, EntryStatus::Success),
            entry(EntryDirection::Out, 900, EntryStatus::Failed),
            entry(EntryDirection::In, 50, EntryStatus::Success),
        ];
        assert_eq!(running_balances(&entries), vec![500, 300, 300, 350]);
    }
}
