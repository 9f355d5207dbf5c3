use bazaar_sdk::objects::EventChannel;
use time::OffsetDateTime;
use uuid::Uuid;

/// Outbox channel for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `bazaar_sdk::objects::EventChannel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "outbox_channel")]
pub enum Channel {
    #[sqlx(rename = "listing.update")]
    ListingUpdate,
    #[sqlx(rename = "wallet.update")]
    WalletUpdate,
    #[sqlx(rename = "notify.push")]
    NotifyPush,
    #[sqlx(rename = "settings.update")]
    SettingsUpdate,
    #[sqlx(rename = "user.blocked")]
    UserBlocked,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::ListingUpdate,
        Channel::WalletUpdate,
        Channel::NotifyPush,
        Channel::SettingsUpdate,
        Channel::UserBlocked,
    ];

    pub fn as_str(self) -> &'static str {
        EventChannel::from(self).as_str()
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Channel> for EventChannel {
    fn from(value: Channel) -> Self {
        match value {
            Channel::ListingUpdate => EventChannel::ListingUpdate,
            Channel::WalletUpdate => EventChannel::WalletUpdate,
            Channel::NotifyPush => EventChannel::NotifyPush,
            Channel::SettingsUpdate => EventChannel::SettingsUpdate,
            Channel::UserBlocked => EventChannel::UserBlocked,
        }
    }
}

impl From<EventChannel> for Channel {
    fn from(value: EventChannel) -> Self {
        match value {
            EventChannel::ListingUpdate => Channel::ListingUpdate,
            EventChannel::WalletUpdate => Channel::WalletUpdate,
            EventChannel::NotifyPush => Channel::NotifyPush,
            EventChannel::SettingsUpdate => Channel::SettingsUpdate,
            EventChannel::UserBlocked => Channel::UserBlocked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "outbox_status")]
pub enum OutboxStatus {
    Pending,
    Delivered,
    Failed,
}

/// Durable event envelope written in the same unit of work as its mutation.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub seq: i64,
    pub channel: Channel,
    #[sqlx(json)]
    pub payload: serde_json::Value,
    /// Dedupe key for consumers; unique per event.
    pub request_id: String,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    /// Lease held by the dispatcher that claimed the event.
    pub claimed_until: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_attempt_at: Option<OffsetDateTime>,
    pub delivered_at: Option<OffsetDateTime>,
}

impl OutboxEvent {
    /// Whether a dispatcher may claim this event at `now`.
    pub fn is_claimable(&self, max_attempts: i32, now: OffsetDateTime) -> bool {
        let eligible = match self.status {
            OutboxStatus::Pending => true,
            OutboxStatus::Failed => self.attempts < max_attempts,
            OutboxStatus::Delivered => false,
        };
        eligible && self.claimed_until.is_none_or(|until| until <= now)
    }
}

#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub channel: Channel,
    pub payload: serde_json::Value,
    pub request_id: String,
    pub created_at: OffsetDateTime,
}
