use axum::{
    Json,
    extract::{Query, State},
};
use bazaar_core::ledger::{LedgerFilter, Page};
use bazaar_sdk::objects::{LedgerPageResponse, LedgerQuery, WalletResponse};

use crate::api::extractors::Principal;
use crate::api::{ApiError, ledger_page_response};
use crate::state::AppState;

/// `GET /wallet`
pub(super) async fn get_wallet(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state.ledger.ensure_wallet(principal.id).await?;
    Ok(Json(wallet.to_response()))
}

/// `GET /wallet/ledger`: the caller's history, newest first.
///
/// Only `kind` and `status` filters apply here; time-range queries are an
/// admin feature.
pub(super) async fn get_own_ledger(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<LedgerPageResponse>, ApiError> {
    let wallet = state.ledger.ensure_wallet(principal.id).await?;
    let query = query.normalized();
    let filter = LedgerFilter {
        kind: query.kind.map(Into::into),
        status: query.status.map(Into::into),
        from: None,
        to: None,
    };
    let page = Page {
        limit: usize::try_from(query.limit).unwrap_or(1),
        offset: usize::try_from(query.offset).unwrap_or(0),
    };

    let ledger = state.ledger.get_ledger(wallet.id, &filter, page).await?;
    Ok(Json(ledger_page_response(ledger)))
}
