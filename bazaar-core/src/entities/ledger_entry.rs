use bazaar_sdk::objects::{
    EntryDirection as SdkEntryDirection, EntryKind as SdkEntryKind,
    EntryStatus as SdkEntryStatus, LedgerEntryResponse, TransactionSummary,
};
use time::OffsetDateTime;
use uuid::Uuid;

use super::unix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "entry_kind")]
pub enum EntryKind {
    Credit,
    Debit,
    Refund,
    Payout,
    Adjustment,
}

impl EntryKind {
    /// The direction implied by the kind. Adjustments carry their own.
    pub fn implied_direction(self) -> Option<EntryDirection> {
        match self {
            EntryKind::Credit | EntryKind::Refund => Some(EntryDirection::In),
            EntryKind::Debit | EntryKind::Payout => Some(EntryDirection::Out),
            EntryKind::Adjustment => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "entry_direction")]
pub enum EntryDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "entry_status")]
pub enum EntryStatus {
    Pending,
    Success,
    Failed,
}

impl From<EntryKind> for SdkEntryKind {
    fn from(value: EntryKind) -> Self {
        match value {
            EntryKind::Credit => SdkEntryKind::Credit,
            EntryKind::Debit => SdkEntryKind::Debit,
            EntryKind::Refund => SdkEntryKind::Refund,
            EntryKind::Payout => SdkEntryKind::Payout,
            EntryKind::Adjustment => SdkEntryKind::Adjustment,
        }
    }
}

impl From<SdkEntryKind> for EntryKind {
    fn from(value: SdkEntryKind) -> Self {
        match value {
            SdkEntryKind::Credit => EntryKind::Credit,
            SdkEntryKind::Debit => EntryKind::Debit,
            SdkEntryKind::Refund => EntryKind::Refund,
            SdkEntryKind::Payout => EntryKind::Payout,
            SdkEntryKind::Adjustment => EntryKind::Adjustment,
        }
    }
}

impl From<EntryDirection> for SdkEntryDirection {
    fn from(value: EntryDirection) -> Self {
        match value {
            EntryDirection::In => SdkEntryDirection::In,
            EntryDirection::Out => SdkEntryDirection::Out,
        }
    }
}

impl From<EntryStatus> for SdkEntryStatus {
    fn from(value: EntryStatus) -> Self {
        match value {
            EntryStatus::Pending => SdkEntryStatus::Pending,
            EntryStatus::Success => SdkEntryStatus::Success,
            EntryStatus::Failed => SdkEntryStatus::Failed,
        }
    }
}

impl From<SdkEntryStatus> for EntryStatus {
    fn from(value: SdkEntryStatus) -> Self {
        match value {
            SdkEntryStatus::Pending => EntryStatus::Pending,
            SdkEntryStatus::Success => EntryStatus::Success,
            SdkEntryStatus::Failed => EntryStatus::Failed,
        }
    }
}

/// Immutable ledger row. Corrections are new compensating entries.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    /// Commit order across all wallets.
    pub seq: i64,
    pub wallet_id: Uuid,
    pub kind: EntryKind,
    pub direction: EntryDirection,
    pub amount: i64,
    pub balance_after: i64,
    pub description: String,
    pub gateway: String,
    pub ref_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub status: EntryStatus,
    #[sqlx(json)]
    pub metadata: serde_json::Value,
    pub created_at: OffsetDateTime,
}

impl LedgerEntry {
    /// Contribution of this entry to the wallet balance.
    pub fn signed_amount(&self) -> i64 {
        if self.status != EntryStatus::Success {
            return 0;
        }
        match self.direction {
            EntryDirection::In => self.amount,
            EntryDirection::Out => -self.amount,
        }
    }

    pub fn summary(&self) -> TransactionSummary {
        TransactionSummary {
            entry_id: self.id,
            kind: self.kind.into(),
            direction: self.direction.into(),
            amount: self.amount,
            description: self.description.clone(),
            ref_id: self.ref_id.clone(),
        }
    }

    pub fn to_response(&self, running_balance: i64) -> LedgerEntryResponse {
        LedgerEntryResponse {
            entry_id: self.id,
            kind: self.kind.into(),
            direction: self.direction.into(),
            amount: self.amount,
            status: self.status.into(),
            description: self.description.clone(),
            gateway: self.gateway.clone(),
            ref_id: self.ref_id.clone(),
            created_at: unix(self.created_at),
            metadata: self.metadata.clone(),
            running_balance,
        }
    }
}

/// Data for inserting a new ledger entry. `id` and `seq` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub wallet_id: Uuid,
    pub kind: EntryKind,
    pub direction: EntryDirection,
    pub amount: i64,
    pub balance_after: i64,
    pub description: String,
    pub gateway: String,
    pub ref_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub status: EntryStatus,
    pub metadata: serde_json::Value,
    pub created_at: OffsetDateTime,
}
