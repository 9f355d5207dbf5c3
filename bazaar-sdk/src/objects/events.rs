//! Payload shapes carried by each outbox channel.
//!
//! Every payload is delivered at least once. Consumers dedupe on the
//! envelope's `request_id`, never on payload contents.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{EntryDirection, EntryKind, ListingStatus, WalletStatus};

/// Summary of the ledger entry that caused a `wallet.update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub entry_id: Uuid,
    pub kind: EntryKind,
    pub direction: EntryDirection,
    pub amount: i64,
    pub description: String,
    pub ref_id: Option<String>,
}

/// `wallet.update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletUpdatePayload {
    pub wallet_id: Uuid,
    pub user_id: Uuid,
    pub balance: i64,
    pub held_amount: i64,
    pub status: WalletStatus,
    /// Absent for status-only changes (freeze, unfreeze).
    pub transaction: Option<TransactionSummary>,
    pub timestamp: i64,
}

/// `listing.update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingUpdatePayload {
    pub listing_id: Uuid,
    pub seller_id: Uuid,
    pub status: ListingStatus,
    pub expires_at: Option<i64>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Push,
    Email,
    Sms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

/// `notify.push` payload: an abstract notification job for the sender workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyPushPayload {
    pub user_id: Uuid,
    pub template_key: String,
    pub channel: NotificationChannel,
    pub priority: NotificationPriority,
    pub data: serde_json::Value,
}

/// `user.blocked` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBlockedPayload {
    pub user_id: Uuid,
    pub blocked_by: Uuid,
    pub reason: String,
    pub timestamp: i64,
}

/// `settings.update` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdatePayload {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_by: Uuid,
    pub timestamp: i64,
}
