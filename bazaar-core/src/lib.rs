#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod audit;
pub mod config;
pub mod context;
pub mod entities;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod moderation;
pub mod notify;
pub mod outbox;
pub mod rate_limit;
pub mod scheduler;
pub mod store;
pub mod transport;
pub mod workflow;
