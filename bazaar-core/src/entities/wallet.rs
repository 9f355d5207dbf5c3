use bazaar_sdk::objects::{
    TransactionSummary, WalletResponse, WalletStatus as SdkWalletStatus, WalletUpdatePayload,
};
use time::OffsetDateTime;
use uuid::Uuid;

use super::unix;

/// Wallet status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `bazaar_sdk::objects::WalletStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "wallet_status")]
pub enum WalletStatus {
    Active,
    Frozen,
}

impl From<WalletStatus> for SdkWalletStatus {
    fn from(value: WalletStatus) -> Self {
        match value {
            WalletStatus::Active => SdkWalletStatus::Active,
            WalletStatus::Frozen => SdkWalletStatus::Frozen,
        }
    }
}

/// One wallet per user. Never deleted, only mutated under a row lock.
///
/// `held_amount` is informational: it tracks the sum of the owner's pending
/// payout requests and is never subtracted from `balance`. New payout
/// requests are checked against [`Wallet::available`]; the balance itself
/// only moves through ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: i64,
    pub held_amount: i64,
    pub status: WalletStatus,
    pub freeze_reason: Option<String>,
    pub freeze_expiry: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Wallet {
    pub fn new(user_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            balance: 0,
            held_amount: 0,
            status: WalletStatus::Active,
            freeze_reason: None,
            freeze_expiry: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Balance not already promised to pending payout requests.
    pub fn available(&self) -> i64 {
        self.balance - self.held_amount
    }

    /// Whether the freeze is in force at `now`. A freeze without an expiry
    /// lasts until it is lifted explicitly.
    pub fn is_frozen_at(&self, now: OffsetDateTime) -> bool {
        self.status == WalletStatus::Frozen && self.freeze_expiry.is_none_or(|expiry| expiry > now)
    }

    /// Lift a freeze whose expiry has passed. Returns `true` if the wallet changed.
    pub fn lift_lapsed_freeze(&mut self, now: OffsetDateTime) -> bool {
        if self.status == WalletStatus::Frozen && !self.is_frozen_at(now) {
            self.status = WalletStatus::Active;
            self.freeze_reason = None;
            self.freeze_expiry = None;
            self.updated_at = now;
            true
        } else {
            false
        }
    }

    pub fn to_update_payload(
        &self,
        transaction: Option<TransactionSummary>,
        now: OffsetDateTime,
    ) -> WalletUpdatePayload {
        WalletUpdatePayload {
            wallet_id: self.id,
            user_id: self.user_id,
            balance: self.balance,
            held_amount: self.held_amount,
            status: self.status.into(),
            transaction,
            timestamp: unix(now),
        }
    }

    pub fn to_response(&self) -> WalletResponse {
        WalletResponse {
            wallet_id: self.id,
            user_id: self.user_id,
            balance: self.balance,
            held_amount: self.held_amount,
            available: self.available(),
            status: self.status.into(),
            freeze_reason: self.freeze_reason.clone(),
            freeze_expiry: self.freeze_expiry.map(unix),
        }
    }
}
