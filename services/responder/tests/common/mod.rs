//! Common test utilities and in-memory fakes

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use errors::{ResponderError, ResponderResult};
use responder::backend::{AlertFeed, FacilityBackend, SubscriptionSink};
use responder::domain::{
    Alert, AlertKey, AlertPayload, Facility, FacilityCategory, NewFacility, SubscriptionRecord,
};
use responder::reconciler::{ClearReason, DeliveryChannel, Presenter};
use responder::worker::{NotificationCard, Notifier, SurfaceLauncher};
use serde_json::{json, Value};

pub const T1: &str = "2025-03-01T10:00:00";
pub const T2: &str = "2025-03-01T10:05:00";

pub fn key(timestamp: &str) -> AlertKey {
    AlertKey::parse(timestamp).unwrap()
}

pub fn alert_json(timestamp: &str, priority: u8) -> Value {
    json!({
        "title": format!("Alert at {}", timestamp),
        "body": "Caller reports smoke on the third floor",
        "priority": priority,
        "emergency_type": "fire",
        "location": "Andheri East",
        "timestamp": timestamp,
        "play_sound": false
    })
}

pub fn payload(timestamp: &str, priority: u8) -> AlertPayload {
    AlertPayload::from_value(alert_json(timestamp, priority)).unwrap()
}

pub fn alert(timestamp: &str, priority: u8) -> Alert {
    Alert::try_from(payload(timestamp, priority)).unwrap()
}

pub fn facility(name: &str) -> Facility {
    Facility {
        id: None,
        name: name.to_string(),
        location: "Andheri".to_string(),
        region: "Maharashtra".to_string(),
        category: FacilityCategory::Hospital,
        registered_at: None,
    }
}

/// Feed answering from a script; the last answer repeats once exhausted
#[derive(Default)]
pub struct ScriptedFeed {
    script: Mutex<VecDeque<ResponderResult<Vec<AlertPayload>>>>,
    last: Mutex<Vec<AlertPayload>>,
    calls: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(script: Vec<ResponderResult<Vec<AlertPayload>>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertFeed for ScriptedFeed {
    async fn fetch_alerts(&self, _center: &str) -> ResponderResult<Vec<AlertPayload>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(payloads)) => {
                *self.last.lock().unwrap() = payloads.clone();
                Ok(payloads)
            },
            Some(Err(e)) => Err(e),
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }
}

/// Directory and subscription store held in memory
#[derive(Default)]
pub struct MemoryBackend {
    pub centers: Mutex<Vec<Facility>>,
    pub subscriptions: Mutex<Vec<SubscriptionRecord>>,
}

impl MemoryBackend {
    pub fn with_centers(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            centers: Mutex::new(names.iter().map(|n| facility(n)).collect()),
            ..Self::default()
        })
    }
}

#[async_trait]
impl FacilityBackend for MemoryBackend {
    async fn list_centers(&self) -> ResponderResult<Vec<Facility>> {
        Ok(self.centers.lock().unwrap().clone())
    }

    async fn register_center(&self, request: &NewFacility) -> ResponderResult<Facility> {
        let mut centers = self.centers.lock().unwrap();
        if centers.iter().any(|c| c.matches_name(&request.name)) {
            return Err(ResponderError::DuplicateName(request.name.clone()));
        }
        let created = facility(&request.name);
        centers.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl SubscriptionSink for MemoryBackend {
    async fn upsert_subscription(&self, record: &SubscriptionRecord) -> ResponderResult<()> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        subscriptions.retain(|s| {
            s.center_name != record.center_name
                || s.subscription.endpoint != record.subscription.endpoint
        });
        subscriptions.push(record.clone());
        Ok(())
    }
}

/// Presenter that records every side effect
#[derive(Default)]
pub struct RecordingPresenter {
    presented: Mutex<Vec<(AlertKey, DeliveryChannel)>>,
    cleared: Mutex<Vec<(AlertKey, ClearReason)>>,
}

impl RecordingPresenter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn presented(&self) -> Vec<(AlertKey, DeliveryChannel)> {
        self.presented.lock().unwrap().clone()
    }

    pub fn cleared(&self) -> Vec<(AlertKey, ClearReason)> {
        self.cleared.lock().unwrap().clone()
    }
}

impl Presenter for RecordingPresenter {
    fn present(&self, alert: &Alert, channel: DeliveryChannel) {
        self.presented.lock().unwrap().push((alert.key, channel));
    }

    fn clear(&self, alert: &Alert, reason: ClearReason) {
        self.cleared.lock().unwrap().push((alert.key, reason));
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub shown: Mutex<Vec<NotificationCard>>,
    pub closed: AtomicUsize,
}

impl Notifier for RecordingNotifier {
    fn show(&self, card: &NotificationCard) {
        self.shown.lock().unwrap().push(card.clone());
    }

    fn close(&self, _tag: &str) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct CountingLauncher {
    pub opened: AtomicUsize,
}

#[async_trait]
impl SurfaceLauncher for CountingLauncher {
    async fn focus_or_open(&self) -> ResponderResult<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Let spawned tasks drain their queues (time is paused in these tests)
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
