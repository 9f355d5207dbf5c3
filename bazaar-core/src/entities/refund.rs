use bazaar_sdk::objects::{RefundResponse, RefundStatus as SdkRefundStatus};
use time::OffsetDateTime;
use uuid::Uuid;

use super::unix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "refund_status")]
pub enum RefundStatus {
    Pending,
    Approved,
    Rejected,
}

impl RefundStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Approved => "approved",
            RefundStatus::Rejected => "rejected",
        }
    }
}

impl From<RefundStatus> for SdkRefundStatus {
    fn from(value: RefundStatus) -> Self {
        match value {
            RefundStatus::Pending => SdkRefundStatus::Pending,
            RefundStatus::Approved => SdkRefundStatus::Approved,
            RefundStatus::Rejected => SdkRefundStatus::Rejected,
        }
    }
}

/// A user-initiated refund awaiting admin review.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefundRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub reason: String,
    pub ref_id: Option<String>,
    pub status: RefundStatus,
    pub ledger_entry_id: Option<Uuid>,
    pub reviewed_by: Option<Uuid>,
    pub review_note: Option<String>,
    pub created_at: OffsetDateTime,
    pub reviewed_at: Option<OffsetDateTime>,
}

impl RefundRequest {
    pub fn idempotency_key(&self) -> String {
        format!("refund:{}", self.id)
    }

    pub fn to_response(&self) -> RefundResponse {
        RefundResponse {
            refund_id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            reason: self.reason.clone(),
            status: self.status.into(),
            ledger_entry_id: self.ledger_entry_id,
            created_at: unix(self.created_at),
        }
    }
}
