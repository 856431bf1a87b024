//! Push channel lifecycle
//!
//! ```text
//! Unregistered -> Registering -> Registered(inactive) -> Registered(active)
//!                      |                  |                     |
//!                      +------------------+---------------------+--> SubscriptionFailed
//! ```
//!
//! Every failure here degrades to "polling only". Nothing in this module can
//! stop a session from receiving alerts through the poll loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use errors::{ResponderError, ResponderResult};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::SubscriptionSink;
use crate::domain::{ApplicationServerKey, KeyUnavailable, PushSubscription, SubscriptionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unregistered,
    Registering,
    Registered { active: bool },
    SubscriptionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Prompt dismissed without an answer
    Default,
    Granted,
    Denied,
}

/// Platform side of the push channel
#[async_trait]
pub trait PushService: Send + Sync {
    /// Install the background delivery worker
    async fn register_worker(&self) -> ResponderResult<()>;

    /// Completes once the worker is active; may never complete
    async fn worker_active(&self);

    async fn request_permission(&self) -> Permission;

    async fn subscribe(&self, key: &ApplicationServerKey) -> ResponderResult<PushSubscription>;
}

/// Result of one activation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Subscribed,
    /// No usable application-server key; push is off by deployment
    NotConfigured,
    PermissionDenied,
    PermissionPending,
    Failed(String),
}

pub struct ChannelManager {
    service: Arc<dyn PushService>,
    sink: Arc<dyn SubscriptionSink>,
    public_key: Option<String>,
    activation_timeout: Duration,
    state: ChannelState,
    permission: Permission,
    subscription: Option<PushSubscription>,
}

impl ChannelManager {
    pub fn new(
        service: Arc<dyn PushService>,
        sink: Arc<dyn SubscriptionSink>,
        public_key: Option<String>,
        activation_timeout: Duration,
    ) -> Self {
        Self {
            service,
            sink,
            public_key,
            activation_timeout,
            state: ChannelState::Unregistered,
            permission: Permission::Default,
            subscription: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn subscription(&self) -> Option<&PushSubscription> {
        self.subscription.as_ref()
    }

    pub fn push_available(&self) -> bool {
        self.subscription.is_some() && self.state != ChannelState::SubscriptionFailed
    }

    /// Run the opt-in flow for `facility`; only ever called on operator action
    pub async fn activate(&mut self, facility: &str) -> PushOutcome {
        if self.permission == Permission::Denied {
            debug!(facility, "Push permission denied earlier this session");
            return PushOutcome::PermissionDenied;
        }

        self.state = ChannelState::Registering;
        if let Err(e) = self.service.register_worker().await {
            return self.fail(facility, e);
        }

        let active = tokio::time::timeout(self.activation_timeout, self.service.worker_active())
            .await
            .is_ok();
        if !active {
            warn!(
                facility,
                timeout_ms = self.activation_timeout.as_millis() as u64,
                "Push worker not active in time, continuing"
            );
        }
        self.state = ChannelState::Registered { active };

        self.permission = self.service.request_permission().await;
        match self.permission {
            Permission::Granted => {},
            Permission::Denied => {
                warn!(facility, "Push permission denied, alerts arrive by polling only");
                return PushOutcome::PermissionDenied;
            },
            Permission::Default => {
                info!(facility, "Push permission not answered");
                return PushOutcome::PermissionPending;
            },
        }

        let key = match ApplicationServerKey::parse(self.public_key.as_deref()) {
            Ok(key) => key,
            Err(KeyUnavailable::NotConfigured) => {
                debug!(facility, "No application server key, push subscription skipped");
                return PushOutcome::NotConfigured;
            },
            Err(KeyUnavailable::Invalid(reason)) => {
                warn!(facility, "Unusable application server key, push subscription skipped: {}", reason);
                return PushOutcome::NotConfigured;
            },
        };

        let subscription = match self.service.subscribe(&key).await {
            Ok(subscription) => subscription,
            Err(e) => return self.fail(facility, e),
        };

        let record = SubscriptionRecord {
            center_name: facility.to_string(),
            subscription: subscription.clone(),
        };
        if let Err(e) = self.sink.upsert_subscription(&record).await {
            return self.fail(facility, e);
        }

        info!(facility, endpoint = %subscription.endpoint, "Push subscription saved");
        self.subscription = Some(subscription);
        PushOutcome::Subscribed
    }

    /// Provider dropped the subscription (404/410 on delivery)
    pub fn invalidate(&mut self, reason: &str) {
        if let Some(subscription) = self.subscription.take() {
            warn!(endpoint = %subscription.endpoint, "Push subscription invalidated: {}", reason);
        }
        self.state = ChannelState::SubscriptionFailed;
    }

    fn fail(&mut self, facility: &str, error: ResponderError) -> PushOutcome {
        warn!(facility, "Push unavailable, continuing with polling: {}", error);
        self.state = ChannelState::SubscriptionFailed;
        self.subscription = None;
        PushOutcome::Failed(error.to_string())
    }
}

/// Push service backed by a subscription provisioned out of band
///
/// Used by the binary: the external push-delivery service hands the endpoint
/// and keys over through configuration, and the in-process [`PushWorker`]
/// stands in for the background delivery context.
///
/// [`PushWorker`]: crate::worker::PushWorker
pub struct ConfiguredPushService {
    subscription: Option<PushSubscription>,
    worker_ready: watch::Receiver<bool>,
}

impl ConfiguredPushService {
    pub fn new(subscription: Option<PushSubscription>, worker_ready: watch::Receiver<bool>) -> Self {
        Self {
            subscription,
            worker_ready,
        }
    }
}

#[async_trait]
impl PushService for ConfiguredPushService {
    async fn register_worker(&self) -> ResponderResult<()> {
        Ok(())
    }

    async fn worker_active(&self) {
        let mut ready = self.worker_ready.clone();
        let closed = ready.wait_for(|active| *active).await.is_err();
        if closed {
            // Worker gone for good; let the activation timeout decide
            std::future::pending::<()>().await;
        }
    }

    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    async fn subscribe(&self, _key: &ApplicationServerKey) -> ResponderResult<PushSubscription> {
        self.subscription
            .clone()
            .ok_or_else(|| ResponderError::Internal("no push subscription provisioned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::domain::SubscriptionKeys;

    fn valid_key() -> String {
        let mut point = [7u8; 65];
        point[0] = 0x04;
        URL_SAFE_NO_PAD.encode(point)
    }

    fn subscription() -> PushSubscription {
        PushSubscription {
            endpoint: "https://push.example/abc".into(),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh: "BPk".into(),
                auth: "a1".into(),
            },
        }
    }

    struct FakeService {
        permission: Permission,
        activates: bool,
        prompts: AtomicUsize,
        subscribes: AtomicUsize,
    }

    impl FakeService {
        fn new(permission: Permission, activates: bool) -> Arc<Self> {
            Arc::new(Self {
                permission,
                activates,
                prompts: AtomicUsize::new(0),
                subscribes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PushService for FakeService {
        async fn register_worker(&self) -> ResponderResult<()> {
            Ok(())
        }

        async fn worker_active(&self) {
            if !self.activates {
                std::future::pending::<()>().await;
            }
        }

        async fn request_permission(&self) -> Permission {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            self.permission
        }

        async fn subscribe(&self, _key: &ApplicationServerKey) -> ResponderResult<PushSubscription> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            Ok(subscription())
        }
    }

    #[derive(Default)]
    struct FakeSink {
        fail: bool,
        records: Mutex<Vec<SubscriptionRecord>>,
    }

    #[async_trait]
    impl SubscriptionSink for FakeSink {
        async fn upsert_subscription(&self, record: &SubscriptionRecord) -> ResponderResult<()> {
            if self.fail {
                return Err(ResponderError::transport("backend down"));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn manager(service: Arc<FakeService>, sink: Arc<FakeSink>, key: Option<String>) -> ChannelManager {
        ChannelManager::new(service, sink, key, Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_timeout_is_not_failure() {
        let service = FakeService::new(Permission::Granted, false);
        let sink = Arc::new(FakeSink::default());
        let mut channel = manager(service, sink.clone(), Some(valid_key()));

        assert_eq!(channel.activate("Central Hospital").await, PushOutcome::Subscribed);
        assert_eq!(channel.state(), ChannelState::Registered { active: false });
        assert!(channel.push_available());

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].center_name, "Central Hospital");
    }

    #[tokio::test]
    async fn test_denial_is_remembered() {
        let service = FakeService::new(Permission::Denied, true);
        let mut channel = manager(service.clone(), Arc::new(FakeSink::default()), Some(valid_key()));

        assert_eq!(channel.activate("Central Hospital").await, PushOutcome::PermissionDenied);
        assert_eq!(channel.activate("Central Hospital").await, PushOutcome::PermissionDenied);
        assert_eq!(service.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(service.subscribes.load(Ordering::SeqCst), 0);
        assert!(!channel.push_available());
    }

    #[tokio::test]
    async fn test_missing_or_placeholder_key_skips_subscribe() {
        for key in [None, Some("NOT_CONFIGURED".to_string()), Some("not-a-key".to_string())] {
            let service = FakeService::new(Permission::Granted, true);
            let sink = Arc::new(FakeSink::default());
            let mut channel = manager(service.clone(), sink.clone(), key);

            assert_eq!(channel.activate("Central Hospital").await, PushOutcome::NotConfigured);
            assert_eq!(channel.state(), ChannelState::Registered { active: true });
            assert_eq!(service.subscribes.load(Ordering::SeqCst), 0);
            assert!(sink.records.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_invalid_key_is_reported() {
        let service = FakeService::new(Permission::Granted, true);
        let mut channel = manager(service, Arc::new(FakeSink::default()), Some("AAAA".into()));

        assert_eq!(channel.activate("Central Hospital").await, PushOutcome::NotConfigured);
        assert!(logs_contain("Unusable application server key"));
    }

    #[tokio::test]
    async fn test_persist_failure_degrades() {
        let service = FakeService::new(Permission::Granted, true);
        let sink = Arc::new(FakeSink {
            fail: true,
            ..FakeSink::default()
        });
        let mut channel = manager(service, sink, Some(valid_key()));

        assert!(matches!(channel.activate("Central Hospital").await, PushOutcome::Failed(_)));
        assert_eq!(channel.state(), ChannelState::SubscriptionFailed);
        assert!(!channel.push_available());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let service = FakeService::new(Permission::Granted, true);
        let mut channel = manager(service, Arc::new(FakeSink::default()), Some(valid_key()));
        channel.activate("Central Hospital").await;

        channel.invalidate("410 Gone");
        assert_eq!(channel.state(), ChannelState::SubscriptionFailed);
        assert!(channel.subscription().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_service_waits_for_worker() {
        let (ready_tx, ready_rx) = watch::channel(false);
        let service = Arc::new(ConfiguredPushService::new(Some(subscription()), ready_rx));
        let mut channel = ChannelManager::new(
            service,
            Arc::new(FakeSink::default()),
            Some(valid_key()),
            Duration::from_secs(5),
        );

        ready_tx.send(true).unwrap();
        assert_eq!(channel.activate("Central Hospital").await, PushOutcome::Subscribed);
        assert_eq!(channel.state(), ChannelState::Registered { active: true });
    }
}
