//! Alert delivery reconciler
//!
//! Push and poll both report alerts here. The reconciler keeps one
//! deduplicated timeline keyed by alert timestamp and fires exactly one
//! presentation per unique alert, whichever channel reports it first.
//!
//! The pure [`Reconciler`] holds the state machine; [`ReconcilerActor`] owns
//! one and serializes every mutation through an mpsc queue, so no locks are
//! involved and the expiry timer is just another select branch.
//!
//! ```text
//!            deliver(new key)              deliver(newer key)
//!   Idle ---------------------> Alerting ----------------------+
//!    ^                            |  ^                          |
//!    |   dismiss / expiry         |  +--------------------------+
//!    +----------------------------+
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use errors::{ResponderError, ResponderResult};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::{Alert, AlertKey};

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Push,
    Poll,
}

impl fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Poll => write!(f, "poll"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Alerting,
}

/// What happened to one delivered alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Presented,
    /// Same identity as the last presented alert
    Duplicate,
    /// Older than the last presented alert
    Superseded,
    /// Sent by a poll loop of an earlier selection
    StaleEpoch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    Dismissed,
    Expired,
    Reset,
}

/// Presentation side effects; called from the reconciler task only
pub trait Presenter: Send + Sync {
    fn present(&self, alert: &Alert, channel: DeliveryChannel);

    fn clear(&self, _alert: &Alert, _reason: ClearReason) {}
}

/// Point-in-time view of the reconciler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcilerSnapshot {
    pub phase: Phase,
    pub epoch: u64,
    pub active: Option<Alert>,
    pub last_presented: Option<AlertKey>,
    pub presentations: u64,
}

/// Dedup state for one facility selection
#[derive(Debug)]
pub struct Reconciler {
    expiry: Duration,
    epoch: u64,
    last_presented: Option<AlertKey>,
    active: Option<Alert>,
    deadline: Option<Instant>,
    presentations: u64,
}

impl Reconciler {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            epoch: 0,
            last_presented: None,
            active: None,
            deadline: None,
            presentations: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.active.is_some() {
            Phase::Alerting
        } else {
            Phase::Idle
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn active(&self) -> Option<&Alert> {
        self.active.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `epoch` is `None` for events not tied to a selection (push)
    pub fn deliver(&mut self, alert: Alert, epoch: Option<u64>, now: Instant) -> Delivery {
        if epoch.is_some_and(|e| e != self.epoch) {
            return Delivery::StaleEpoch;
        }

        match self.last_presented {
            Some(last) if alert.key == last => return Delivery::Duplicate,
            Some(last) if alert.key < last => return Delivery::Superseded,
            _ => {},
        }

        self.last_presented = Some(alert.key);
        self.active = Some(alert);
        self.deadline = Some(now + self.expiry);
        self.presentations += 1;
        Delivery::Presented
    }

    /// Operator acknowledgment; the identity stays remembered
    pub fn dismiss(&mut self) -> Option<Alert> {
        self.deadline = None;
        self.active.take()
    }

    pub fn expire_if_due(&mut self, now: Instant) -> Option<Alert> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.dismiss(),
            _ => None,
        }
    }

    /// Forget everything and start a new selection epoch
    pub fn reset(&mut self, epoch: u64) -> Option<Alert> {
        self.epoch = epoch;
        self.last_presented = None;
        self.deadline = None;
        self.active.take()
    }

    pub fn snapshot(&self) -> ReconcilerSnapshot {
        ReconcilerSnapshot {
            phase: self.phase(),
            epoch: self.epoch,
            active: self.active.clone(),
            last_presented: self.last_presented,
            presentations: self.presentations,
        }
    }
}

#[derive(Debug)]
pub enum ReconcilerCommand {
    Deliver {
        alert: Box<Alert>,
        channel: DeliveryChannel,
        epoch: Option<u64>,
    },
    Dismiss,
    Reset {
        epoch: u64,
    },
    Snapshot(oneshot::Sender<ReconcilerSnapshot>),
}

/// Cloneable sender side of the reconciler task
#[derive(Debug, Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::Sender<ReconcilerCommand>,
}

impl ReconcilerHandle {
    async fn send(&self, command: ReconcilerCommand) -> ResponderResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ResponderError::Internal("reconciler stopped".into()))
    }

    pub async fn deliver(
        &self,
        alert: Alert,
        channel: DeliveryChannel,
        epoch: Option<u64>,
    ) -> ResponderResult<()> {
        self.send(ReconcilerCommand::Deliver {
            alert: Box::new(alert),
            channel,
            epoch,
        })
        .await
    }

    pub async fn dismiss(&self) -> ResponderResult<()> {
        self.send(ReconcilerCommand::Dismiss).await
    }

    pub async fn reset(&self, epoch: u64) -> ResponderResult<()> {
        self.send(ReconcilerCommand::Reset { epoch }).await
    }

    pub async fn snapshot(&self) -> ResponderResult<ReconcilerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(ReconcilerCommand::Snapshot(tx)).await?;
        rx.await
            .map_err(|_| ResponderError::Internal("reconciler stopped".into()))
    }
}

pub struct ReconcilerActor {
    reconciler: Reconciler,
    presenter: Arc<dyn Presenter>,
    rx: mpsc::Receiver<ReconcilerCommand>,
}

impl ReconcilerActor {
    pub fn new(expiry: Duration, presenter: Arc<dyn Presenter>) -> (Self, ReconcilerHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = Self {
            reconciler: Reconciler::new(expiry),
            presenter,
            rx,
        };
        (actor, ReconcilerHandle { tx })
    }

    pub fn spawn(
        expiry: Duration,
        presenter: Arc<dyn Presenter>,
        token: CancellationToken,
    ) -> (ReconcilerHandle, JoinHandle<()>) {
        let (actor, handle) = Self::new(expiry, presenter);
        (handle, tokio::spawn(actor.run(token)))
    }

    pub async fn run(mut self, token: CancellationToken) {
        debug!("Reconciler started");

        loop {
            let deadline = self.reconciler.deadline();
            tokio::select! {
                () = token.cancelled() => break,
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                () = sleep_until(deadline) => {
                    if let Some(alert) = self.reconciler.expire_if_due(Instant::now()) {
                        info!(alert = %alert.key, "Alert expired without acknowledgment");
                        self.presenter.clear(&alert, ClearReason::Expired);
                    }
                },
            }
        }

        debug!("Reconciler stopped");
    }

    fn handle(&mut self, command: ReconcilerCommand) {
        match command {
            ReconcilerCommand::Deliver {
                alert,
                channel,
                epoch,
            } => self.deliver(*alert, channel, epoch),
            ReconcilerCommand::Dismiss => {
                if let Some(alert) = self.reconciler.dismiss() {
                    info!(alert = %alert.key, "Alert dismissed");
                    self.presenter.clear(&alert, ClearReason::Dismissed);
                }
            },
            ReconcilerCommand::Reset { epoch } => {
                if let Some(alert) = self.reconciler.reset(epoch) {
                    self.presenter.clear(&alert, ClearReason::Reset);
                }
                debug!(epoch, "Reconciler reset");
            },
            ReconcilerCommand::Snapshot(reply) => {
                let _ = reply.send(self.reconciler.snapshot());
            },
        }
    }

    fn deliver(&mut self, alert: Alert, channel: DeliveryChannel, epoch: Option<u64>) {
        let key = alert.key;
        let previous = self.reconciler.active().map(|a| a.key);

        match self.reconciler.deliver(alert, epoch, Instant::now()) {
            Delivery::Presented => {
                if let Some(active) = self.reconciler.active() {
                    info!(
                        alert = %key,
                        %channel,
                        priority = active.priority.label(),
                        replaced = ?previous,
                        phase = "alerting",
                        "Presenting alert"
                    );
                    self.presenter.present(active, channel);
                }
            },
            Delivery::Duplicate => debug!(alert = %key, %channel, "Duplicate alert absorbed"),
            Delivery::Superseded => {
                debug!(alert = %key, %channel, "Alert older than last presented absorbed")
            },
            Delivery::StaleEpoch => debug!(
                alert = %key,
                %channel,
                epoch = ?epoch,
                current = self.reconciler.epoch(),
                "Event from earlier selection discarded"
            ),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AlertPayload;

    fn alert(timestamp: &str) -> Alert {
        Alert::try_from(AlertPayload {
            timestamp: Some(timestamp.into()),
            body: Some("Fire reported on 3rd floor".into()),
            priority: Some(1.into()),
            ..AlertPayload::default()
        })
        .unwrap()
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_same_identity_presents_once() {
        let mut r = reconciler();
        let now = Instant::now();

        assert_eq!(r.deliver(alert("2025-03-01T10:00:00"), Some(0), now), Delivery::Presented);
        assert_eq!(r.deliver(alert("2025-03-01T10:00:00"), None, now), Delivery::Duplicate);
        assert_eq!(r.phase(), Phase::Alerting);

        r.dismiss();
        assert_eq!(r.phase(), Phase::Idle);
        assert_eq!(r.deliver(alert("2025-03-01T10:00:00"), Some(0), now), Delivery::Duplicate);
        assert_eq!(r.snapshot().presentations, 1);
    }

    #[tokio::test]
    async fn test_newer_alert_replaces_active() {
        let mut r = reconciler();
        let now = Instant::now();

        r.deliver(alert("2025-03-01T10:00:00"), None, now);
        assert_eq!(r.deliver(alert("2025-03-01T10:00:05"), None, now), Delivery::Presented);
        assert_eq!(r.deliver(alert("2025-03-01T10:00:00"), None, now), Delivery::Superseded);
        assert_eq!(r.active().unwrap().key, AlertKey::parse("2025-03-01T10:00:05").unwrap());
    }

    #[tokio::test]
    async fn test_expiry_and_reset() {
        let mut r = reconciler();
        let now = Instant::now();

        r.deliver(alert("2025-03-01T10:00:00"), None, now);
        assert!(r.expire_if_due(now + Duration::from_secs(59)).is_none());
        assert!(r.expire_if_due(now + Duration::from_secs(60)).is_some());
        assert_eq!(r.phase(), Phase::Idle);

        r.reset(1);
        assert_eq!(r.deliver(alert("2025-03-01T10:00:00"), Some(0), now), Delivery::StaleEpoch);
        assert_eq!(r.deliver(alert("2025-03-01T10:00:00"), Some(1), now), Delivery::Presented);
    }
}
