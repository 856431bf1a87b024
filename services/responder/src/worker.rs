//! Background push delivery worker
//!
//! Lives independently of any foreground surface. It shows a notification for
//! every inbound push payload and hands alerts to the foreground reconciler
//! once a surface has signalled that it is ready to receive them. Until then
//! the newest alert is held.

use std::sync::Arc;

use async_trait::async_trait;
use errors::{ResponderError, ResponderResult};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{Alert, AlertPayload, GENERIC_ALERT_BODY, GENERIC_ALERT_TITLE};
use crate::reconciler::{DeliveryChannel, ReconcilerHandle};

/// Tag shared by every alert notification, so a newer one replaces the older
pub const NOTIFICATION_TAG: &str = "emergency-alert";

const MESSAGE_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAction {
    View,
    Dismiss,
}

impl NotificationAction {
    pub fn title(&self) -> &'static str {
        match self {
            Self::View => "View Alert",
            Self::Dismiss => "Dismiss",
        }
    }
}

/// Persistent notification built from one push payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationCard {
    pub tag: &'static str,
    pub title: String,
    pub body: String,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
    /// Validated alert behind the card; `None` for a generic card
    pub alert: Option<Alert>,
}

impl NotificationCard {
    /// Never fails: an undecodable payload yields the generic card
    pub fn from_payload(raw: &str) -> Self {
        let (title, body, alert) = match AlertPayload::from_json(raw) {
            Ok(payload) => {
                let title = payload.title.clone().filter(|t| !t.trim().is_empty());
                let body = payload.body.clone().filter(|b| !b.trim().is_empty());
                let alert = match Alert::try_from(payload) {
                    Ok(alert) => Some(alert),
                    Err(e) => {
                        warn!("Push payload has no usable alert: {}", e);
                        None
                    },
                };
                (title, body, alert)
            },
            Err(e) => {
                warn!("Undecodable push payload, showing generic alert: {}", e);
                (None, None, None)
            },
        };

        Self {
            tag: NOTIFICATION_TAG,
            title: title.unwrap_or_else(|| GENERIC_ALERT_TITLE.to_string()),
            body: body.unwrap_or_else(|| GENERIC_ALERT_BODY.to_string()),
            require_interaction: true,
            actions: vec![NotificationAction::View, NotificationAction::Dismiss],
            alert,
        }
    }
}

/// System notification surface
pub trait Notifier: Send + Sync {
    fn show(&self, card: &NotificationCard);

    fn close(&self, tag: &str);
}

/// Brings a foreground surface up; the surface later reports `SurfaceReady`
#[async_trait]
pub trait SurfaceLauncher: Send + Sync {
    async fn focus_or_open(&self) -> ResponderResult<()>;
}

#[derive(Debug)]
pub enum WorkerMessage {
    /// Raw push payload
    Push(String),
    /// Operator clicked an action on the shown notification
    Action(NotificationAction),
    SurfaceReady(ReconcilerHandle),
    SurfaceClosed,
}

#[derive(Debug, Clone)]
pub struct PushWorkerHandle {
    tx: mpsc::Sender<WorkerMessage>,
    ready: watch::Receiver<bool>,
}

impl PushWorkerHandle {
    async fn send(&self, message: WorkerMessage) -> ResponderResult<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| ResponderError::Internal("push worker stopped".into()))
    }

    pub async fn push(&self, raw: impl Into<String>) -> ResponderResult<()> {
        self.send(WorkerMessage::Push(raw.into())).await
    }

    pub async fn action(&self, action: NotificationAction) -> ResponderResult<()> {
        self.send(WorkerMessage::Action(action)).await
    }

    pub async fn surface_ready(&self, reconciler: ReconcilerHandle) -> ResponderResult<()> {
        self.send(WorkerMessage::SurfaceReady(reconciler)).await
    }

    pub async fn surface_closed(&self) -> ResponderResult<()> {
        self.send(WorkerMessage::SurfaceClosed).await
    }

    /// Flips to `true` once the worker task runs
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready.clone()
    }
}

pub struct PushWorker {
    notifier: Arc<dyn Notifier>,
    launcher: Arc<dyn SurfaceLauncher>,
    surface: Option<ReconcilerHandle>,
    /// Alert waiting for a surface; only the newest is kept
    pending: Option<Alert>,
    /// Alert behind the currently shown notification
    shown: Option<Alert>,
}

impl PushWorker {
    pub fn new(notifier: Arc<dyn Notifier>, launcher: Arc<dyn SurfaceLauncher>) -> Self {
        Self {
            notifier,
            launcher,
            surface: None,
            pending: None,
            shown: None,
        }
    }

    pub fn spawn(self, token: CancellationToken) -> (PushWorkerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        let (ready_tx, ready) = watch::channel(false);
        let task = tokio::spawn(self.run(rx, ready_tx, token));
        (PushWorkerHandle { tx, ready }, task)
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<WorkerMessage>,
        ready: watch::Sender<bool>,
        token: CancellationToken,
    ) {
        ready.send_replace(true);
        info!("Push worker active");

        loop {
            let message = tokio::select! {
                () = token.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.handle(message).await;
        }

        ready.send_replace(false);
        info!("Push worker stopped");
    }

    pub async fn handle(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Push(raw) => self.on_push(&raw).await,
            WorkerMessage::Action(NotificationAction::View) => self.on_view().await,
            WorkerMessage::Action(NotificationAction::Dismiss) => {
                self.notifier.close(NOTIFICATION_TAG);
                self.shown = None;
            },
            WorkerMessage::SurfaceReady(reconciler) => {
                debug!("Foreground surface ready");
                self.surface = Some(reconciler);
                if let Some(alert) = self.pending.take() {
                    info!(alert = %alert.key, "Handing held alert to foreground");
                    self.forward(alert).await;
                }
            },
            WorkerMessage::SurfaceClosed => {
                debug!("Foreground surface closed");
                self.surface = None;
            },
        }
    }

    pub fn pending(&self) -> Option<&Alert> {
        self.pending.as_ref()
    }

    async fn on_push(&mut self, raw: &str) {
        let card = NotificationCard::from_payload(raw);
        self.notifier.show(&card);
        self.shown = card.alert.clone();

        if let Some(alert) = card.alert {
            if self.surface.is_some() {
                self.forward(alert).await;
            } else {
                self.hold(alert);
            }
        }
    }

    async fn on_view(&mut self) {
        self.notifier.close(NOTIFICATION_TAG);
        let alert = self.shown.take();

        if self.surface.is_some() {
            if let Some(alert) = alert {
                self.forward(alert).await;
            }
            return;
        }

        if let Some(alert) = alert {
            self.hold(alert);
        }
        if let Err(e) = self.launcher.focus_or_open().await {
            warn!("Could not open foreground surface: {}", e);
        }
    }

    fn hold(&mut self, alert: Alert) {
        match &self.pending {
            Some(held) if held.key >= alert.key => {},
            _ => {
                debug!(alert = %alert.key, "Holding alert until a surface is ready");
                self.pending = Some(alert);
            },
        }
    }

    async fn forward(&mut self, alert: Alert) {
        let Some(surface) = self.surface.clone() else {
            self.hold(alert);
            return;
        };

        if let Err(e) = surface.deliver(alert.clone(), DeliveryChannel::Push, None).await {
            warn!("Foreground surface went away: {}", e);
            self.surface = None;
            self.hold(alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_from_well_formed_payload() {
        let card = NotificationCard::from_payload(
            r#"{"title": "CRITICAL Emergency - Fire", "body": "Location: Andheri",
                "priority": 1, "timestamp": "2025-03-01T10:00:00"}"#,
        );
        assert_eq!(card.title, "CRITICAL Emergency - Fire");
        assert_eq!(card.tag, NOTIFICATION_TAG);
        assert!(card.require_interaction);
        assert_eq!(card.actions, vec![NotificationAction::View, NotificationAction::Dismiss]);
        assert!(card.alert.is_some());
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_card_falls_back_to_generic() {
        let card = NotificationCard::from_payload("not json at all");
        assert_eq!(card.title, GENERIC_ALERT_TITLE);
        assert_eq!(card.body, GENERIC_ALERT_BODY);
        assert!(card.alert.is_none());
        assert!(logs_contain("Undecodable push payload"));

        let card = NotificationCard::from_payload(r#"{"title": "Heads up"}"#);
        assert_eq!(card.title, "Heads up");
        assert_eq!(card.body, GENERIC_ALERT_BODY);
        assert!(card.alert.is_none());
        assert!(logs_contain("Push payload has no usable alert"));
    }
}
