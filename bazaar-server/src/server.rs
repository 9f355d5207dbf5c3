//! Axum server setup and router configuration.

use crate::api;
use crate::state::AppState;
use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        .merge(api::router())
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple health check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Serve until `shutdown` completes, then drain in-flight requests.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use bazaar_core::audit::TracingAuditSink;
    use bazaar_core::config::{ConfigStore, ListingConfig, PayoutConfig, RateLimitConfig, RateLimitPolicy};
    use bazaar_core::gateway::{GatewayClient, GatewayError, GatewayPayoutStatus};
    use bazaar_core::ledger::LedgerEngine;
    use bazaar_core::moderation::Moderation;
    use bazaar_core::notify::{NotificationSender, OutboxNotifier};
    use bazaar_core::outbox::{EventOutbox, outbox_wake_channel};
    use bazaar_core::rate_limit::{MemoryCounterStore, OperationType, RateLimiter};
    use bazaar_core::scheduler::Scheduler;
    use bazaar_core::store::{MemoryStore, Store};
    use bazaar_core::transport::BroadcastHub;
    use bazaar_core::workflow::{PayoutWorkflow, RefundWorkflow};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct NoGateway;

    #[async_trait]
    impl GatewayClient for NoGateway {
        async fn execute_payout(
            &self,
            payout_id: Uuid,
            _amount: i64,
            _bank_details: &Value,
        ) -> Result<String, GatewayError> {
            Ok(format!("gw-{payout_id}"))
        }

        async fn check_status(&self, reference: &str) -> Result<GatewayPayoutStatus, GatewayError> {
            Err(GatewayError::UnknownPayout(reference.to_string()))
        }
    }

    struct DownGateway;

    #[async_trait]
    impl GatewayClient for DownGateway {
        async fn execute_payout(
            &self,
            _payout_id: Uuid,
            _amount: i64,
            _bank_details: &Value,
        ) -> Result<String, GatewayError> {
            Err(GatewayError::Unavailable {
                status: 503,
                body: "maintenance".into(),
            })
        }

        async fn check_status(&self, reference: &str) -> Result<GatewayPayoutStatus, GatewayError> {
            Err(GatewayError::UnknownPayout(reference.to_string()))
        }
    }

    fn test_router(rate_limits: RateLimitConfig) -> Router {
        router_with_gateway(Arc::new(NoGateway), rate_limits)
    }

    fn router_with_gateway(gateway: Arc<dyn GatewayClient>, rate_limits: RateLimitConfig) -> Router {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (wake_tx, _wake_rx) = outbox_wake_channel();
        let outbox = EventOutbox::new(store.clone(), wake_tx);
        let ledger = LedgerEngine::new(store.clone(), outbox.clone(), Arc::new(TracingAuditSink));
        let notifier: Arc<dyn NotificationSender> = Arc::new(OutboxNotifier::new(outbox));
        let payouts = PayoutWorkflow::new(
            ledger.clone(),
            store.clone(),
            gateway,
            notifier.clone(),
            PayoutConfig::default(),
        );
        let refunds = RefundWorkflow::new(ledger.clone(), store.clone(), notifier.clone());
        let moderation = Moderation::new(ledger.clone(), store, notifier, ListingConfig::default());
        let rate_limits = ConfigStore::new(rate_limits);
        let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()), rate_limits.clone());

        build_router(AppState {
            ledger,
            payouts,
            refunds,
            moderation,
            limiter,
            rate_limits,
            hub: Arc::new(BroadcastHub::new(16)),
            jobs: Scheduler::new().handle(),
        })
    }

    fn json_request(method: &str, uri: &str, principal: Uuid, role: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-principal-id", principal.to_string())
            .header("x-principal-role", role)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_principal() {
        let router = test_router(RateLimitConfig::default());
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn missing_principal_is_unauthorized() {
        let router = test_router(RateLimitConfig::default());
        let response = router
            .oneshot(Request::builder().uri("/wallet").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "unauthenticated");
    }

    #[tokio::test]
    async fn admin_routes_reject_plain_users() {
        let router = test_router(RateLimitConfig::default());
        let request = json_request(
            "POST",
            &format!("/admin/users/{}/block", Uuid::now_v7()),
            Uuid::now_v7(),
            "user",
            json!({ "reason": "spam" }),
        );
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"], "admin_required");
    }

    #[tokio::test]
    async fn issued_refund_replays_with_same_key() {
        let router = test_router(RateLimitConfig::default());
        let admin = Uuid::now_v7();
        let user = Uuid::now_v7();
        let body = json!({ "user_id": user, "amount": 2500, "reason": "damaged item" });

        let without_key = json_request("POST", "/admin/refunds", admin, "admin", body.clone());
        let response = router.clone().oneshot(without_key).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut first = json_request("POST", "/admin/refunds", admin, "admin", body.clone());
        first
            .headers_mut()
            .insert("idempotency-key", "order-42".parse().unwrap());
        let response = router.clone().oneshot(first).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["replayed"], false);

        let mut again = json_request("POST", "/admin/refunds", admin, "admin", body);
        again
            .headers_mut()
            .insert("idempotency-key", "order-42".parse().unwrap());
        let response = router.clone().oneshot(again).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let replayed = body_json(response).await;
        assert_eq!(replayed["replayed"], true);
        assert_eq!(replayed["entry"]["entry_id"], created["entry"]["entry_id"]);

        let wallet = Request::builder()
            .uri("/wallet")
            .header("x-principal-id", user.to_string())
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(wallet).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["balance"], 2500);
    }

    #[tokio::test]
    async fn payout_requests_are_rate_limited() {
        let limits = RateLimitConfig {
            policies: HashMap::from([(
                OperationType::PayoutRequest,
                RateLimitPolicy::per_window(1, Duration::from_secs(60)),
            )]),
        };
        let router = test_router(limits);
        let user = Uuid::now_v7();
        let body = json!({ "amount": 100, "method": "bank_transfer", "bank_details": {} });

        let first = json_request("POST", "/payouts", user, "user", body.clone());
        let response = router.clone().oneshot(first).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let second = json_request("POST", "/payouts", user, "user", body);
        let response = router.oneshot(second).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        let error = body_json(response).await;
        assert_eq!(error["error"], "rate_limited");
        assert!(error["reset_at"].is_i64());
    }

    #[tokio::test]
    async fn payout_left_pending_at_the_gateway_is_accepted() {
        let router = router_with_gateway(Arc::new(DownGateway), RateLimitConfig::default());
        let admin = Uuid::now_v7();
        let user = Uuid::now_v7();

        let mut fund = json_request(
            "POST",
            "/admin/refunds",
            admin,
            "admin",
            json!({ "user_id": user, "amount": 1000, "reason": "seed" }),
        );
        fund.headers_mut()
            .insert("idempotency-key", "seed-1".parse().unwrap());
        let response = router.clone().oneshot(fund).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let request = json_request(
            "POST",
            "/payouts",
            user,
            "user",
            json!({ "amount": 400, "method": "bank_transfer", "bank_details": {} }),
        );
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let payout_id = body_json(response).await["payout_id"].as_str().unwrap().to_string();

        let approve = json_request(
            "POST",
            &format!("/admin/payouts/{payout_id}/approve"),
            admin,
            "admin",
            json!({ "reason": "ok" }),
        );
        let response = router.oneshot(approve).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["status"], "approved");
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let router = test_router(RateLimitConfig::default());
        let request = json_request("POST", "/admin/jobs/nope/run", Uuid::now_v7(), "admin", json!({}));
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
