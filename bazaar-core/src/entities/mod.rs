pub mod ledger_entry;
pub mod listing;
pub mod outbox_event;
pub mod payout;
pub mod refund;
pub mod wallet;

pub use ledger_entry::{EntryDirection, EntryKind, EntryStatus, LedgerEntry, NewLedgerEntry};
pub use listing::{Listing, ListingStatus, ReminderWindow};
pub use outbox_event::{Channel, NewOutboxEvent, OutboxEvent, OutboxStatus};
pub use payout::{PayoutRequest, PayoutStatus};
pub use refund::{RefundRequest, RefundStatus};
pub use wallet::{Wallet, WalletStatus};

/// Convert a timestamp into the unix seconds used by the wire objects.
pub(crate) fn unix(ts: time::OffsetDateTime) -> i64 {
    ts.unix_timestamp()
}
