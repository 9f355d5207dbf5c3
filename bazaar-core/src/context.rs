use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

/// Per-request context threaded through every mutating operation.
///
/// Carries the request id that ends up in audit records and, suffixed with a
/// per-request counter, in each outbox event's dedupe key.
#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    next_event: AtomicU32,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            next_event: AtomicU32::new(0),
        }
    }

    /// Context with a freshly generated request id.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Context for work started by a background job rather than a caller.
    pub fn for_job(job: &str) -> Self {
        Self::new(format!("job:{job}:{}", Uuid::new_v4()))
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Dedupe key for the next event emitted under this request.
    pub(crate) fn next_event_key(&self) -> String {
        let n = self.next_event.fetch_add(1, Ordering::Relaxed);
        format!("{}#{n}", self.request_id)
    }
}
