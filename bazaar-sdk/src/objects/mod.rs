pub mod admin;
pub mod events;
pub mod live;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub use admin::*;
pub use events::*;
pub use live::{LiveCloseCode, LiveFrame};

/// Outbox channel as seen by consumers of the live stream.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `bazaar-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventChannel {
    #[serde(rename = "listing.update")]
    ListingUpdate,
    #[serde(rename = "wallet.update")]
    WalletUpdate,
    #[serde(rename = "notify.push")]
    NotifyPush,
    #[serde(rename = "settings.update")]
    SettingsUpdate,
    #[serde(rename = "user.blocked")]
    UserBlocked,
}

impl EventChannel {
    pub const ALL: [EventChannel; 5] = [
        EventChannel::ListingUpdate,
        EventChannel::WalletUpdate,
        EventChannel::NotifyPush,
        EventChannel::SettingsUpdate,
        EventChannel::UserBlocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventChannel::ListingUpdate => "listing.update",
            EventChannel::WalletUpdate => "wallet.update",
            EventChannel::NotifyPush => "notify.push",
            EventChannel::SettingsUpdate => "settings.update",
            EventChannel::UserBlocked => "user.blocked",
        }
    }
}

impl std::fmt::Display for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown event channel: {0}")]
pub struct UnknownChannel(pub String);

impl FromStr for EventChannel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventChannel::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Active,
    Frozen,
}

/// Ledger entry type for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Credit,
    Debit,
    Refund,
    Payout,
    Adjustment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    PendingReview,
    Active,
    Rejected,
    Expired,
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingStatus::PendingReview => write!(f, "pending_review"),
            ListingStatus::Active => write!(f, "active"),
            ListingStatus::Rejected => write!(f, "rejected"),
            ListingStatus::Expired => write!(f, "expired"),
        }
    }
}
