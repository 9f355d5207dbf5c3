use bazaar_sdk::objects::{ListingResponse, ListingStatus as SdkListingStatus, ListingUpdatePayload};
use time::OffsetDateTime;
use uuid::Uuid;

use super::unix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "listing_status")]
pub enum ListingStatus {
    PendingReview,
    Active,
    Rejected,
    Expired,
}

impl ListingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingStatus::PendingReview => "pending_review",
            ListingStatus::Active => "active",
            ListingStatus::Rejected => "rejected",
            ListingStatus::Expired => "expired",
        }
    }
}

impl From<ListingStatus> for SdkListingStatus {
    fn from(value: ListingStatus) -> Self {
        match value {
            ListingStatus::PendingReview => SdkListingStatus::PendingReview,
            ListingStatus::Active => SdkListingStatus::Active,
            ListingStatus::Rejected => SdkListingStatus::Rejected,
            ListingStatus::Expired => SdkListingStatus::Expired,
        }
    }
}

/// The slice of a marketplace listing that moderation and expiry care about.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Listing {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub title: String,
    pub status: ListingStatus,
    pub expires_at: Option<OffsetDateTime>,
    pub reminder_sent_3d: bool,
    pub reminder_sent_1d: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Listing {
    pub fn new(seller_id: Uuid, title: String, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::now_v7(),
            seller_id,
            title,
            status: ListingStatus::PendingReview,
            expires_at: None,
            reminder_sent_3d: false,
            reminder_sent_1d: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_past_due(&self, now: OffsetDateTime) -> bool {
        self.status == ListingStatus::Active && self.expires_at.is_some_and(|e| e <= now)
    }

    /// Whether the listing has crossed `window`'s threshold without a reminder.
    pub fn needs_reminder(&self, window: ReminderWindow, now: OffsetDateTime) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        self.status == ListingStatus::Active
            && !window.already_sent(self)
            && expires_at > now
            && expires_at <= now + window.lead()
    }

    pub fn to_update_payload(&self, now: OffsetDateTime) -> ListingUpdatePayload {
        ListingUpdatePayload {
            listing_id: self.id,
            seller_id: self.seller_id,
            status: self.status.into(),
            expires_at: self.expires_at.map(unix),
            timestamp: unix(now),
        }
    }

    pub fn to_response(&self) -> ListingResponse {
        ListingResponse {
            listing_id: self.id,
            seller_id: self.seller_id,
            title: self.title.clone(),
            status: self.status.into(),
            expires_at: self.expires_at.map(unix),
        }
    }
}

/// Expiry reminder thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderWindow {
    /// T-72h
    ThreeDays,
    /// T-1h
    OneHour,
}

impl ReminderWindow {
    pub const ALL: [ReminderWindow; 2] = [ReminderWindow::ThreeDays, ReminderWindow::OneHour];

    pub fn lead(self) -> time::Duration {
        match self {
            ReminderWindow::ThreeDays => time::Duration::hours(72),
            ReminderWindow::OneHour => time::Duration::hours(1),
        }
    }

    pub fn template_key(self) -> &'static str {
        match self {
            ReminderWindow::ThreeDays => "listing.expiring_3d",
            ReminderWindow::OneHour => "listing.expiring_1h",
        }
    }

    pub fn already_sent(self, listing: &Listing) -> bool {
        match self {
            ReminderWindow::ThreeDays => listing.reminder_sent_3d,
            ReminderWindow::OneHour => listing.reminder_sent_1d,
        }
    }

    pub fn mark_sent(self, listing: &mut Listing) {
        match self {
            ReminderWindow::ThreeDays => listing.reminder_sent_3d = true,
            ReminderWindow::OneHour => listing.reminder_sent_1d = true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn active_listing(expires_at: OffsetDateTime, now: OffsetDateTime) -> Listing {
        let mut listing = Listing::new(Uuid::now_v7(), "Road bike".into(), now);
        listing.status = ListingStatus::Active;
        listing.expires_at = Some(expires_at);
        listing
    }

    #[test]
    fn reminder_thresholds() {
        let now = datetime!(2026-03-01 12:00 UTC);
        let in_two_days = active_listing(now + time::Duration::hours(48), now);
        assert!(in_two_days.needs_reminder(ReminderWindow::ThreeDays, now));
        assert!(!in_two_days.needs_reminder(ReminderWindow::OneHour, now));

        let in_thirty_minutes = active_listing(now + time::Duration::minutes(30), now);
        assert!(in_thirty_minutes.needs_reminder(ReminderWindow::OneHour, now));

        let mut sent = in_thirty_minutes.clone();
        ReminderWindow::OneHour.mark_sent(&mut sent);
        assert!(!sent.needs_reminder(ReminderWindow::OneHour, now));
    }

    #[test]
    fn past_due_listing_gets_no_reminder() {
        let now = datetime!(2026-03-01 12:00 UTC);
        let overdue = active_listing(now - time::Duration::hours(1), now);
        assert!(overdue.is_past_due(now));
        assert!(!overdue.needs_reminder(ReminderWindow::OneHour, now));
    }
}
