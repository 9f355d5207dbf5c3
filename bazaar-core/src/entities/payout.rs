use bazaar_sdk::objects::{PayoutResponse, PayoutStatus as SdkPayoutStatus};
use time::OffsetDateTime;
use uuid::Uuid;

use super::unix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "payout_status")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Approved => "approved",
            PayoutStatus::Rejected => "rejected",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PayoutStatus::Rejected | PayoutStatus::Completed | PayoutStatus::Failed
        )
    }

    /// `pending -> approved -> completed`, `pending -> rejected`,
    /// `approved -> failed`.
    pub fn can_transition_to(self, next: PayoutStatus) -> bool {
        matches!(
            (self, next),
            (PayoutStatus::Pending, PayoutStatus::Approved)
                | (PayoutStatus::Pending, PayoutStatus::Rejected)
                | (PayoutStatus::Approved, PayoutStatus::Completed)
                | (PayoutStatus::Approved, PayoutStatus::Failed)
        )
    }
}

impl From<PayoutStatus> for SdkPayoutStatus {
    fn from(value: PayoutStatus) -> Self {
        match value {
            PayoutStatus::Pending => SdkPayoutStatus::Pending,
            PayoutStatus::Approved => SdkPayoutStatus::Approved,
            PayoutStatus::Rejected => SdkPayoutStatus::Rejected,
            PayoutStatus::Completed => SdkPayoutStatus::Completed,
            PayoutStatus::Failed => SdkPayoutStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PayoutRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub method: String,
    #[sqlx(json)]
    pub bank_details: serde_json::Value,
    pub status: PayoutStatus,
    pub gateway_id: Option<String>,
    /// Risk scores snapshotted when the request was made.
    pub fraud_score: Option<f64>,
    pub trust_score: Option<f64>,
    pub reviewed_by: Option<Uuid>,
    pub review_note: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: OffsetDateTime,
    pub approved_at: Option<OffsetDateTime>,
    pub rejected_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub failed_at: Option<OffsetDateTime>,
}

impl PayoutRequest {
    /// Reference the gateway knows this payout by. Before `execute` returns
    /// a gateway id, the payout id itself is the client reference.
    pub fn gateway_reference(&self) -> String {
        self.gateway_id
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Idempotency key of the debit posted on approval.
    pub fn debit_key(&self) -> String {
        format!("payout:{}:debit", self.id)
    }

    /// Idempotency key of the compensating refund, which is the payout id.
    pub fn compensation_key(&self) -> String {
        self.id.to_string()
    }

    pub fn to_response(&self) -> PayoutResponse {
        PayoutResponse {
            payout_id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            method: self.method.clone(),
            status: self.status.into(),
            gateway_id: self.gateway_id.clone(),
            created_at: unix(self.created_at),
            approved_at: self.approved_at.map(unix),
            completed_at: self.completed_at.map(unix),
            failed_at: self.failed_at.map(unix),
            rejected_at: self.rejected_at.map(unix),
        }
    }
}
