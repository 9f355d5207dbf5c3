//! Custom Axum extractors for the authenticated principal and request metadata.
//!
//! Authentication happens upstream. The gateway in front of this service
//! forwards the verified principal as headers:
//!
//! ```text
//! X-Principal-Id:   0190f3b4-...      (uuid)
//! X-Principal-Role: admin | user
//! X-Request-Id:     any opaque string (optional, generated when absent)
//! Idempotency-Key:  any opaque string (required by some admin actions)
//! ```

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use bazaar_core::context::RequestContext;
use std::convert::Infallible;
use uuid::Uuid;

use super::ApiError;

pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";
pub const PRINCIPAL_ROLE_HEADER: &str = "x-principal-role";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

const ADMIN_ROLE: &str = "admin";
const MAX_HEADER_VALUE_LEN: usize = 255;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_HEADER_VALUE_LEN)
}

fn principal_id(parts: &Parts) -> Result<Uuid, ApiError> {
    let raw = parts
        .headers
        .get(PRINCIPAL_ID_HEADER)
        .ok_or(ApiError::Unauthenticated)?
        .to_str()
        .map_err(|_| ApiError::Unauthenticated)?;
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::Unauthenticated)
}

/// Any authenticated principal. User routes act on `id`'s own resources.
pub struct Principal {
    pub id: Uuid,
    pub is_admin: bool,
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = principal_id(parts)?;
        let is_admin = header_str(&parts.headers, PRINCIPAL_ROLE_HEADER)
            .is_some_and(|role| role.eq_ignore_ascii_case(ADMIN_ROLE));
        Ok(Principal { id, is_admin })
    }
}

/// A principal holding the admin role. The id is recorded as the actor of
/// every admin operation.
pub struct AdminPrincipal(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for AdminPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Principal::from_request_parts(parts, state).await? {
            Principal { id, is_admin: true } => Ok(AdminPrincipal(id)),
            Principal { .. } => Err(ApiError::AdminRequired),
        }
    }
}

/// Request context seeded from `X-Request-Id`, so retries of the same
/// request produce the same outbox dedupe keys.
pub struct RequestCtx(pub RequestContext);

impl<S: Send + Sync> FromRequestParts<S> for RequestCtx {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = match header_str(&parts.headers, REQUEST_ID_HEADER) {
            Some(id) => RequestContext::new(id),
            None => RequestContext::generate(),
        };
        Ok(RequestCtx(ctx))
    }
}

/// The raw `Idempotency-Key` header. Whether it is required is up to the
/// operation.
pub struct IdempotencyKey(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for IdempotencyKey {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(IdempotencyKey(
            header_str(&parts.headers, IDEMPOTENCY_KEY_HEADER).map(str::to_string),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn admin_requires_the_admin_role() {
        let id = Uuid::now_v7();
        let id_str = id.to_string();
        let mut as_admin = parts(&[
            (PRINCIPAL_ID_HEADER, id_str.as_str()),
            (PRINCIPAL_ROLE_HEADER, "Admin"),
        ]);
        let AdminPrincipal(admin) = AdminPrincipal::from_request_parts(&mut as_admin, &())
            .await
            .unwrap();
        assert_eq!(admin, id);

        let mut as_user = parts(&[
            (PRINCIPAL_ID_HEADER, id_str.as_str()),
            (PRINCIPAL_ROLE_HEADER, "user"),
        ]);
        let rejected = AdminPrincipal::from_request_parts(&mut as_user, &()).await;
        assert!(matches!(rejected, Err(ApiError::AdminRequired)));

        let mut anonymous = parts(&[(PRINCIPAL_ROLE_HEADER, "admin")]);
        let rejected = AdminPrincipal::from_request_parts(&mut anonymous, &()).await;
        assert!(matches!(rejected, Err(ApiError::Unauthenticated)));
    }

    #[tokio::test]
    async fn request_id_is_taken_from_the_header() {
        let mut with_id = parts(&[(REQUEST_ID_HEADER, "req-81")]);
        let Ok(RequestCtx(ctx)) = RequestCtx::from_request_parts(&mut with_id, &()).await;
        assert_eq!(ctx.request_id(), "req-81");

        let mut without = parts(&[]);
        let Ok(RequestCtx(ctx)) = RequestCtx::from_request_parts(&mut without, &()).await;
        assert!(!ctx.request_id().is_empty());
    }

    #[tokio::test]
    async fn blank_idempotency_key_counts_as_missing() {
        let mut blank = parts(&[(IDEMPOTENCY_KEY_HEADER, "   ")]);
        let Ok(IdempotencyKey(key)) = IdempotencyKey::from_request_parts(&mut blank, &()).await;
        assert!(key.is_none());

        let mut set = parts(&[(IDEMPOTENCY_KEY_HEADER, "r-42")]);
        let Ok(IdempotencyKey(key)) = IdempotencyKey::from_request_parts(&mut set, &()).await;
        assert_eq!(key.as_deref(), Some("r-42"));
    }
}
