//! Admin API handlers.
//!
//! Every endpoint requires an admin principal; the principal id is recorded
//! as the actor of the operation.
//!
//! # Endpoints
//!
//! - `GET  /payouts/{id}`                 – show a payout request
//! - `POST /payouts/{id}/approve`         – approve, debit and execute a payout
//! - `POST /payouts/{id}/reject`          – reject a payout and release its hold
//! - `POST /refunds`                      – issue a refund (`Idempotency-Key` required)
//! - `POST /refunds/{id}/approve`         – approve a user's refund request
//! - `POST /refunds/{id}/reject`          – reject a user's refund request
//! - `POST /wallets/{id}/adjust`          – signed manual balance correction
//! - `POST /wallets/{id}/freeze`          – freeze a wallet
//! - `POST /wallets/{id}/unfreeze`        – lift a freeze
//! - `GET  /wallets/{id}/ledger`          – paged, filtered ledger history
//! - `POST /users/{id}/block`             – block a user and freeze their wallet
//! - `POST /listings/{id}/approve`        – activate a listing
//! - `POST /listings/{id}/reject`         – reject a listing
//! - `PUT  /settings/{key}`               – announce a settings change
//! - `GET  /jobs`                         – list scheduled jobs
//! - `POST /jobs/{name}/run`              – run a job now, honoring its run-lock

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;

mod jobs;
mod listings;
mod payouts;
mod refunds;
mod settings;
mod users;
mod wallets;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payouts/{payout_id}", get(payouts::get_payout))
        .route(
            "/payouts/{payout_id}/approve",
            post(payouts::approve_payout),
        )
        .route("/payouts/{payout_id}/reject", post(payouts::reject_payout))
        .route("/refunds", post(refunds::issue_refund))
        .route(
            "/refunds/{refund_id}/approve",
            post(refunds::approve_refund),
        )
        .route("/refunds/{refund_id}/reject", post(refunds::reject_refund))
        .route("/wallets/{wallet_id}/adjust", post(wallets::adjust_balance))
        .route("/wallets/{wallet_id}/freeze", post(wallets::freeze_wallet))
        .route(
            "/wallets/{wallet_id}/unfreeze",
            post(wallets::unfreeze_wallet),
        )
        .route("/wallets/{wallet_id}/ledger", get(wallets::get_ledger))
        .route("/users/{user_id}/block", post(users::block_user))
        .route(
            "/listings/{listing_id}/approve",
            post(listings::approve_listing),
        )
        .route(
            "/listings/{listing_id}/reject",
            post(listings::reject_listing),
        )
        .route("/settings/{key}", put(settings::update_setting))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{name}/run", post(jobs::run_job))
}
