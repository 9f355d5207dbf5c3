#![allow(dead_code)]

use async_trait::async_trait;
use bazaar_core::audit::MemoryAuditSink;
use bazaar_core::config::{ListingConfig, OutboxConfig, PayoutConfig};
use bazaar_core::context::RequestContext;
use bazaar_core::entities::{Channel, OutboxEvent, Wallet};
use bazaar_core::gateway::{GatewayClient, GatewayError, GatewayPayoutStatus};
use bazaar_core::ledger::{LedgerEngine, Posting};
use bazaar_core::moderation::Moderation;
use bazaar_core::notify::{NotificationSender, OutboxNotifier};
use bazaar_core::outbox::{EventOutbox, OutboxDispatcher, OutboxWakeReceiver, outbox_wake_channel};
use bazaar_core::rate_limit::{CounterError, CounterStore, WindowHit};
use bazaar_core::store::{MemoryStore, Store};
use bazaar_core::transport::{BroadcastHub, LiveMessage, LiveTransport, TransportError};
use bazaar_core::workflow::{PayoutWorkflow, RefundWorkflow};
use bazaar_core::entities::EntryKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// How the fake gateway answers `execute_payout`.
#[derive(Debug, Clone)]
pub enum Execution {
    Succeed,
    Reject(String),
    Unavailable,
    Hang,
}

pub struct FakeGateway {
    execution: Mutex<Execution>,
    statuses: Mutex<HashMap<String, GatewayPayoutStatus>>,
    pub executed: AtomicUsize,
    pub checked: AtomicUsize,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            execution: Mutex::new(Execution::Succeed),
            statuses: Mutex::new(HashMap::new()),
            executed: AtomicUsize::new(0),
            checked: AtomicUsize::new(0),
        }
    }
}

impl FakeGateway {
    pub fn set_execution(&self, execution: Execution) {
        *self.execution.lock().unwrap() = execution;
    }

    pub fn set_status(&self, reference: impl Into<String>, status: GatewayPayoutStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(reference.into(), status);
    }
}

#[async_trait]
impl GatewayClient for FakeGateway {
    async fn execute_payout(
        &self,
        payout_id: Uuid,
        _amount: i64,
        _bank_details: &serde_json::Value,
    ) -> Result<String, GatewayError> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        let execution = self.execution.lock().unwrap().clone();
        match execution {
            Execution::Succeed => Ok(format!("gw-{payout_id}")),
            Execution::Reject(reason) => Err(GatewayError::Rejected(reason)),
            Execution::Unavailable => Err(GatewayError::Unavailable {
                status: 503,
                body: "maintenance".into(),
            }),
            Execution::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(format!("gw-{payout_id}"))
            }
        }
    }

    async fn check_status(&self, reference: &str) -> Result<GatewayPayoutStatus, GatewayError> {
        self.checked.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownPayout(reference.to_string()))
    }
}

/// Rejects the first `failures` publishes, then forwards to an inner hub.
pub struct FlakyTransport {
    remaining_failures: AtomicUsize,
    pub attempts: AtomicUsize,
    pub inner: BroadcastHub,
}

impl FlakyTransport {
    pub fn new(failures: usize) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            inner: BroadcastHub::new(64),
        }
    }
}

#[async_trait]
impl LiveTransport for FlakyTransport {
    async fn publish(&self, channel: Channel, message: &LiveMessage) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Unavailable("socket reset".into()));
        }
        self.inner.publish(channel, message).await
    }
}

/// Counter store whose backend is always down.
pub struct DownCounterStore;

#[async_trait]
impl CounterStore for DownCounterStore {
    async fn hit(
        &self,
        _key: &str,
        _window: Duration,
        _now: OffsetDateTime,
    ) -> Result<WindowHit, CounterError> {
        Err(CounterError::Unavailable("connection refused".into()))
    }

    async fn clear_prefix(&self, _prefix: &str) -> Result<u64, CounterError> {
        Err(CounterError::Unavailable("connection refused".into()))
    }

    async fn purge_expired(&self, _now: OffsetDateTime) -> Result<u64, CounterError> {
        Err(CounterError::Unavailable("connection refused".into()))
    }
}

pub fn test_payout_config() -> PayoutConfig {
    PayoutConfig {
        gateway_timeout: Duration::from_millis(100),
        ..PayoutConfig::default()
    }
}

/// Every core service wired over one in-memory store.
pub struct Harness {
    pub store: MemoryStore,
    pub shared: Arc<dyn Store>,
    pub outbox: EventOutbox,
    pub audit: Arc<MemoryAuditSink>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<dyn NotificationSender>,
    pub ledger: LedgerEngine,
    pub payouts: PayoutWorkflow,
    pub refunds: RefundWorkflow,
    pub moderation: Moderation,
    wake_rx: OutboxWakeReceiver,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_payout_config(test_payout_config())
    }

    pub fn with_payout_config(payout_config: PayoutConfig) -> Self {
        let store = MemoryStore::new();
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let (wake_tx, wake_rx) = outbox_wake_channel();
        let outbox = EventOutbox::new(shared.clone(), wake_tx);
        let audit = Arc::new(MemoryAuditSink::new());
        let ledger = LedgerEngine::new(shared.clone(), outbox.clone(), audit.clone());
        let notifier: Arc<dyn NotificationSender> = Arc::new(OutboxNotifier::new(outbox.clone()));
        let gateway = Arc::new(FakeGateway::default());
        let payouts = PayoutWorkflow::new(
            ledger.clone(),
            shared.clone(),
            gateway.clone(),
            notifier.clone(),
            payout_config,
        );
        let refunds = RefundWorkflow::new(ledger.clone(), shared.clone(), notifier.clone());
        let moderation = Moderation::new(
            ledger.clone(),
            shared.clone(),
            notifier.clone(),
            ListingConfig::default(),
        );

        Self {
            store,
            shared,
            outbox,
            audit,
            gateway,
            notifier,
            ledger,
            payouts,
            refunds,
            moderation,
            wake_rx,
        }
    }

    pub fn dispatcher(&self, transport: Arc<dyn LiveTransport>) -> OutboxDispatcher {
        OutboxDispatcher::new(
            self.shared.clone(),
            transport,
            OutboxConfig {
                max_attempts: 3,
                ..OutboxConfig::default()
            },
        )
    }

    /// A fresh user whose wallet holds `balance`.
    pub async fn funded_wallet(&self, balance: i64) -> Wallet {
        let user_id = Uuid::now_v7();
        let wallet = self.ledger.ensure_wallet(user_id).await.unwrap();
        if balance > 0 {
            self.ledger
                .credit(
                    wallet.id,
                    Posting::new(EntryKind::Credit, balance, "seed funds"),
                    &ctx(),
                )
                .await
                .unwrap();
        }
        self.ledger.wallet(wallet.id).await.unwrap()
    }

    pub async fn events_on(&self, channel: Channel) -> Vec<OutboxEvent> {
        self.store
            .outbox_events()
            .await
            .into_iter()
            .filter(|event| event.channel == channel)
            .collect()
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::generate()
}
