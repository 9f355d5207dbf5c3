//! Admin moderation: listing review and renewal, user blocks, settings.

use crate::audit::{AuditRecord, record_quietly};
use crate::config::ListingConfig;
use crate::context::RequestContext;
use crate::entities::{Channel, Listing, ListingStatus, ReminderWindow};
use crate::error::LedgerError;
use crate::ledger::{self, LedgerEngine};
use crate::notify::{NotificationJob, NotificationSender, enqueue_quietly};
use crate::store::{Store, UnitOfWork};
use bazaar_sdk::objects::{SettingsUpdatePayload, UserBlockedPayload};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

/// Freeze reason applied to the wallet of a blocked user.
pub const USER_BLOCKED_REASON: &str = "user blocked";

const LISTING_REJECTED: &str = "listing.rejected";
const LISTING_EXPIRED: &str = "listing.expired";

async fn lock_listing(uow: &mut dyn UnitOfWork, listing_id: Uuid) -> Result<Listing, LedgerError> {
    uow.lock_listing(listing_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("listing", listing_id))
}

fn transition_error(listing: &Listing, to: ListingStatus) -> LedgerError {
    LedgerError::InvalidTransition {
        entity: "listing",
        id: listing.id,
        from: listing.status.as_str(),
        to: to.as_str(),
    }
}

#[derive(Clone)]
pub struct Moderation {
    ledger: LedgerEngine,
    store: Arc<dyn Store>,
    notifier: Arc<dyn NotificationSender>,
    config: ListingConfig,
}

impl Moderation {
    pub fn new(
        ledger: LedgerEngine,
        store: Arc<dyn Store>,
        notifier: Arc<dyn NotificationSender>,
        config: ListingConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            notifier,
            config,
        }
    }

    pub async fn listing(&self, listing_id: Uuid) -> Result<Listing, LedgerError> {
        self.store
            .listing(listing_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("listing", listing_id))
    }

    /// Write `listing` back and emit its `listing.update`, then commit.
    async fn save_and_publish(
        &self,
        mut uow: Box<dyn UnitOfWork>,
        listing: &Listing,
        ctx: &RequestContext,
        now: OffsetDateTime,
    ) -> Result<(), LedgerError> {
        uow.save_listing(listing).await?;
        self.ledger
            .outbox()
            .emit(
                uow.as_mut(),
                Channel::ListingUpdate,
                &listing.to_update_payload(now),
                ctx,
            )
            .await?;
        uow.commit().await?;
        self.ledger.outbox().committed();
        Ok(())
    }

    /// Create a listing awaiting review.
    pub async fn submit_listing(
        &self,
        seller_id: Uuid,
        title: &str,
        ctx: &RequestContext,
    ) -> Result<Listing, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let listing = Listing::new(seller_id, title.to_string(), now);
        let mut uow = self.store.begin().await?;
        uow.insert_listing(&listing).await?;
        self.ledger
            .outbox()
            .emit(
                uow.as_mut(),
                Channel::ListingUpdate,
                &listing.to_update_payload(now),
                ctx,
            )
            .await?;
        uow.commit().await?;
        self.ledger.outbox().committed();
        Ok(listing)
    }

    #[tracing::instrument(skip_all, err, fields(listing_id = %listing_id, admin_id = %admin_id))]
    pub async fn approve_listing(
        &self,
        listing_id: Uuid,
        admin_id: Uuid,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<Listing, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut listing = lock_listing(uow.as_mut(), listing_id).await?;
        if listing.status != ListingStatus::PendingReview {
            return Err(transition_error(&listing, ListingStatus::Active));
        }

        let active_days = i64::from(self.config.active_days);
        let expires_at = now
            .checked_add(time::Duration::days(active_days))
            .ok_or(LedgerError::OutOfRange {
                field: "active_days",
                value: active_days,
            })?;
        listing.status = ListingStatus::Active;
        listing.expires_at = Some(expires_at);
        listing.reminder_sent_3d = false;
        listing.reminder_sent_1d = false;
        listing.updated_at = now;
        self.save_and_publish(uow, &listing, ctx, now).await?;

        record_quietly(
            self.ledger.audit(),
            AuditRecord::new("listing.approve", "listing", listing.id, ctx)
                .actor(admin_id)
                .reason(reason),
        )
        .await;
        Ok(listing)
    }

    #[tracing::instrument(skip_all, err, fields(listing_id = %listing_id, admin_id = %admin_id))]
    pub async fn reject_listing(
        &self,
        listing_id: Uuid,
        admin_id: Uuid,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<Listing, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut listing = lock_listing(uow.as_mut(), listing_id).await?;
        if listing.status != ListingStatus::PendingReview {
            return Err(transition_error(&listing, ListingStatus::Rejected));
        }

        listing.status = ListingStatus::Rejected;
        listing.updated_at = now;
        self.save_and_publish(uow, &listing, ctx, now).await?;

        record_quietly(
            self.ledger.audit(),
            AuditRecord::new("listing.reject", "listing", listing.id, ctx)
                .actor(admin_id)
                .reason(reason),
        )
        .await;
        let job = NotificationJob::push(
            listing.seller_id,
            LISTING_REJECTED,
            serde_json::json!({ "listing_id": listing.id, "reason": reason }),
        );
        enqueue_quietly(self.notifier.as_ref(), job, ctx).await;
        Ok(listing)
    }

    /// Extend an active or expired listing by `extend_days` from the later
    /// of its current expiry and now. Only the seller may renew.
    pub async fn renew_listing(
        &self,
        listing_id: Uuid,
        seller_id: Uuid,
        extend_days: u32,
        ctx: &RequestContext,
    ) -> Result<Listing, LedgerError> {
        if extend_days == 0 {
            return Err(LedgerError::InvalidAmount(0));
        }
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut listing = lock_listing(uow.as_mut(), listing_id).await?;
        if listing.seller_id != seller_id {
            return Err(LedgerError::Forbidden {
                entity: "listing",
                id: listing.id,
                actor: seller_id,
            });
        }
        if !matches!(listing.status, ListingStatus::Active | ListingStatus::Expired) {
            return Err(transition_error(&listing, ListingStatus::Active));
        }

        let base = listing.expires_at.map_or(now, |e| e.max(now));
        let expires_at = base
            .checked_add(time::Duration::days(i64::from(extend_days)))
            .ok_or(LedgerError::OutOfRange {
                field: "extend_days",
                value: i64::from(extend_days),
            })?;
        listing.status = ListingStatus::Active;
        listing.expires_at = Some(expires_at);
        listing.reminder_sent_3d = false;
        listing.reminder_sent_1d = false;
        listing.updated_at = now;
        self.save_and_publish(uow, &listing, ctx, now).await?;

        info!(listing_id = %listing.id, extend_days, "Listing renewed");
        Ok(listing)
    }

    /// Expire a past-due listing. Returns `None` when the listing is no
    /// longer past due, e.g. it was renewed or already expired.
    pub async fn expire_listing(
        &self,
        listing_id: Uuid,
        now: OffsetDateTime,
        ctx: &RequestContext,
    ) -> Result<Option<Listing>, LedgerError> {
        let mut uow = self.store.begin().await?;
        let mut listing = lock_listing(uow.as_mut(), listing_id).await?;
        if !listing.is_past_due(now) {
            return Ok(None);
        }

        listing.status = ListingStatus::Expired;
        listing.updated_at = now;
        self.save_and_publish(uow, &listing, ctx, now).await?;

        let job = NotificationJob::push(
            listing.seller_id,
            LISTING_EXPIRED,
            serde_json::json!({ "listing_id": listing.id, "title": listing.title }),
        );
        enqueue_quietly(self.notifier.as_ref(), job, ctx).await;
        Ok(Some(listing))
    }

    /// Record that `window`'s reminder went out. Returns `false` if another
    /// run already recorded it.
    pub async fn mark_reminder_sent(
        &self,
        listing_id: Uuid,
        window: ReminderWindow,
        now: OffsetDateTime,
    ) -> Result<bool, LedgerError> {
        let mut uow = self.store.begin().await?;
        let mut listing = lock_listing(uow.as_mut(), listing_id).await?;
        if window.already_sent(&listing) {
            return Ok(false);
        }
        window.mark_sent(&mut listing);
        listing.updated_at = now;
        uow.save_listing(&listing).await?;
        uow.commit().await?;
        Ok(true)
    }

    /// Freeze the user's wallet and announce the block, in one unit.
    #[tracing::instrument(skip_all, err, fields(user_id = %user_id, admin_id = %admin_id))]
    pub async fn block_user(
        &self,
        user_id: Uuid,
        admin_id: Uuid,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<(), LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut uow = self.store.begin().await?;
        let mut wallet = ledger::lock_user_wallet(uow.as_mut(), user_id, now).await?;
        self.ledger
            .freeze_locked(uow.as_mut(), &mut wallet, USER_BLOCKED_REASON, None, ctx, now)
            .await?;
        let payload = UserBlockedPayload {
            user_id,
            blocked_by: admin_id,
            reason: reason.to_string(),
            timestamp: now.unix_timestamp(),
        };
        self.ledger
            .outbox()
            .emit(uow.as_mut(), Channel::UserBlocked, &payload, ctx)
            .await?;
        uow.commit().await?;
        self.ledger.outbox().committed();

        record_quietly(
            self.ledger.audit(),
            AuditRecord::new("user.block", "user", user_id, ctx)
                .actor(admin_id)
                .reason(reason)
                .metadata(serde_json::json!({ "wallet_id": wallet.id })),
        )
        .await;
        Ok(())
    }

    /// Announce a settings change. The setting itself lives outside the core.
    pub async fn update_setting(
        &self,
        key: &str,
        value: serde_json::Value,
        admin_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<(), LedgerError> {
        let payload = SettingsUpdatePayload {
            key: key.to_string(),
            value,
            updated_by: admin_id,
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
        };
        self.ledger
            .outbox()
            .emit_standalone(Channel::SettingsUpdate, &payload, ctx)
            .await?;

        record_quietly(
            self.ledger.audit(),
            AuditRecord::new("settings.update", "setting", key, ctx)
                .actor(admin_id)
                .metadata(serde_json::json!({ "value": payload.value })),
        )
        .await;
        Ok(())
    }
}
