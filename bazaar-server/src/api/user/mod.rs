//! User API handlers.
//!
//! The caller acts on their own wallet, payouts, refunds and listings. The
//! principal id from the upstream authenticator identifies the user.
//!
//! # Endpoints
//!
//! - `GET  /wallet`                    – the caller's wallet, created on first use
//! - `GET  /wallet/ledger`             – the caller's ledger history
//! - `POST /payouts`                   – request a payout (places a hold)
//! - `POST /refunds`                   – ask for a refund, pending admin review
//! - `POST /listings`                  – submit a listing for review
//! - `POST /listings/{listing_id}/renew` – extend an active or expired listing

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

mod listings;
mod payouts;
mod refunds;
mod wallet;

/// Build the User API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/wallet", get(wallet::get_wallet))
        .route("/wallet/ledger", get(wallet::get_own_ledger))
        .route("/payouts", post(payouts::request_payout))
        .route("/refunds", post(refunds::request_refund))
        .route("/listings", post(listings::submit_listing))
        .route(
            "/listings/{listing_id}/renew",
            post(listings::renew_listing),
        )
}
