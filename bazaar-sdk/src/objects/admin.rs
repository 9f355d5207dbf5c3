//! Admin and user API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    EntryDirection, EntryKind, EntryStatus, ListingStatus, PayoutStatus, RefundStatus,
    WalletStatus,
};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body for approve/reject style admin actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub reason: String,
}

/// `POST /admin/refunds`. The idempotency key travels in the
/// `Idempotency-Key` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRefundRequest {
    pub user_id: Uuid,
    pub amount: i64,
    pub reason: String,
    #[serde(default)]
    pub ref_id: Option<String>,
}

/// `POST /admin/wallets/{id}/adjust`. Negative amounts remove funds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustBalanceRequest {
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreezeWalletRequest {
    pub reason: String,
    /// Unix timestamp after which the freeze lapses.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockUserRequest {
    pub reason: String,
}

/// `POST /payouts`, issued by the wallet owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePayoutRequest {
    pub amount: i64,
    pub method: String,
    pub bank_details: serde_json::Value,
    #[serde(default)]
    pub fraud_score: Option<f64>,
    #[serde(default)]
    pub trust_score: Option<f64>,
}

/// `POST /refunds`, issued by the wallet owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRefundRequest {
    pub amount: i64,
    pub reason: String,
    #[serde(default)]
    pub ref_id: Option<String>,
}

/// `POST /listings`, issued by the seller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitListingRequest {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewListingRequest {
    pub extend_days: u32,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletResponse {
    pub wallet_id: Uuid,
    pub user_id: Uuid,
    pub balance: i64,
    pub held_amount: i64,
    pub available: i64,
    pub status: WalletStatus,
    pub freeze_reason: Option<String>,
    pub freeze_expiry: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntryResponse {
    pub entry_id: Uuid,
    pub kind: EntryKind,
    pub direction: EntryDirection,
    pub amount: i64,
    pub status: EntryStatus,
    pub description: String,
    pub gateway: String,
    pub ref_id: Option<String>,
    pub created_at: i64,
    pub metadata: serde_json::Value,
    /// Wallet balance immediately after this entry.
    pub running_balance: i64,
}

/// Result of a ledger-posting admin action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingResponse {
    pub entry: LedgerEntryResponse,
    /// `true` when the idempotency key had already been applied and the
    /// original entry is being returned.
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerPageResponse {
    pub wallet: WalletResponse,
    pub entries: Vec<LedgerEntryResponse>,
    pub total: u64,
    /// Whether folding every successful entry reproduces the stored balance.
    pub consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutResponse {
    pub payout_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub method: String,
    pub status: PayoutStatus,
    pub gateway_id: Option<String>,
    pub created_at: i64,
    pub approved_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub failed_at: Option<i64>,
    pub rejected_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResponse {
    pub refund_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub reason: String,
    pub status: RefundStatus,
    pub ledger_entry_id: Option<Uuid>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingResponse {
    pub listing_id: Uuid,
    pub seller_id: Uuid,
    pub title: String,
    pub status: ListingStatus,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunOutcome {
    Completed,
    Failed,
    SkippedInFlight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunResponse {
    pub job: String,
    pub outcome: JobRunOutcome,
}

/// Error body returned by every API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<i64>,
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 200;
const MAX_OFFSET: i64 = 100_000;

/// Query parameters for `GET /admin/wallets/{id}/ledger`.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub kind: Option<EntryKind>,
    pub status: Option<EntryStatus>,
    /// Unix timestamp, inclusive.
    pub from: Option<i64>,
    /// Unix timestamp, exclusive.
    pub to: Option<i64>,
}

impl LedgerQuery {
    /// Clamp `limit` and `offset` into the accepted range.
    pub fn normalized(mut self) -> Self {
        self.limit = self.limit.clamp(1, MAX_LIMIT);
        self.offset = self.offset.clamp(0, MAX_OFFSET);
        self
    }
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}
