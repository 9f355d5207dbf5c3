use crate::rate_limit::RateLimiter;
use crate::scheduler::{Job, JobError};
use async_trait::async_trait;
use time::OffsetDateTime;

pub struct RateLimitResetJob {
    limiter: RateLimiter,
}

impl RateLimitResetJob {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Job for RateLimitResetJob {
    fn name(&self) -> &'static str {
        "rate_limit_reset"
    }

    async fn run(&self) -> Result<(), JobError> {
        self.limiter.reset_daily().await?;
        self.limiter.purge_expired(OffsetDateTime::now_utc()).await?;
        Ok(())
    }
}
