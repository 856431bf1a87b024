//! Polling reconciliation loop
//!
//! Backstop for the push channel: fetch the feed of the selected facility on
//! a fixed interval and forward the newest alert when it is newer than
//! anything seen since the selection was made.

use std::sync::Arc;
use std::time::Duration;

use errors::ResponderResult;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::AlertFeed;
use crate::domain::{Alert, AlertKey, AlertPayload};
use crate::reconciler::{DeliveryChannel, ReconcilerHandle};

/// What one fetch produced
#[derive(Debug, Default)]
pub struct Observation {
    pub new_alert: Option<Alert>,
    /// Newer than last seen, but hidden behind `new_alert`
    pub superseded: usize,
}

/// Last-seen state of one selection; a new selection starts a new cursor
#[derive(Debug, Default)]
pub struct FeedCursor {
    last_seen: Option<AlertKey>,
    seeded: bool,
}

impl FeedCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen(&self) -> Option<AlertKey> {
        self.last_seen
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Diff one fetch against the cursor and advance it
    ///
    /// The first fetch only seeds. Records without a parseable timestamp take
    /// no part in the diff.
    pub fn observe(&mut self, payloads: Vec<AlertPayload>) -> Observation {
        let mut keyed: Vec<(AlertKey, AlertPayload)> = payloads
            .into_iter()
            .filter_map(|payload| {
                let key = AlertKey::parse(payload.timestamp.as_deref()?).ok()?;
                Some((key, payload))
            })
            .collect();
        // Stable: on equal timestamps the feed's own order decides
        keyed.sort_by(|a, b| b.0.cmp(&a.0));

        let previous = self.last_seen;
        let was_seeded = std::mem::replace(&mut self.seeded, true);

        let Some((newest_key, _)) = keyed.first() else {
            return Observation::default();
        };
        let newest_key = *newest_key;
        self.last_seen = Some(previous.map_or(newest_key, |p| p.max(newest_key)));

        if !was_seeded || previous.is_some_and(|p| newest_key <= p) {
            return Observation::default();
        }

        let superseded = keyed
            .iter()
            .skip(1)
            .filter(|(key, _)| previous.map_or(true, |p| *key > p) && *key < newest_key)
            .count();

        let (_, payload) = keyed.swap_remove(0);
        let new_alert = match Alert::try_from(payload) {
            Ok(alert) => Some(alert),
            Err(e) => {
                warn!(alert = %newest_key, "Dropping malformed alert from feed: {}", e);
                None
            },
        };

        Observation {
            new_alert,
            superseded,
        }
    }
}

pub struct PollLoop {
    feed: Arc<dyn AlertFeed>,
    facility: String,
    epoch: u64,
    interval: Duration,
    jitter: Duration,
    reconciler: ReconcilerHandle,
}

impl PollLoop {
    pub fn new(
        feed: Arc<dyn AlertFeed>,
        facility: impl Into<String>,
        epoch: u64,
        interval: Duration,
        reconciler: ReconcilerHandle,
    ) -> Self {
        Self {
            feed,
            facility: facility.into(),
            epoch,
            interval,
            jitter: Duration::ZERO,
            reconciler,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }

    /// Fetch now and on every tick until `token` is cancelled
    pub async fn run(self, token: CancellationToken) {
        let mut cursor = FeedCursor::new();
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            facility = %self.facility,
            epoch = self.epoch,
            interval_secs = self.interval.as_secs(),
            "Polling started"
        );

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = interval.tick() => {},
            }

            let delay = self.jitter_delay();
            if !delay.is_zero() {
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(delay) => {},
                }
            }

            let fetched = tokio::select! {
                () = token.cancelled() => break,
                fetched = self.poll_once(&mut cursor) => fetched,
            };

            match fetched {
                Ok(Some(alert)) => {
                    if self
                        .reconciler
                        .deliver(alert, DeliveryChannel::Poll, Some(self.epoch))
                        .await
                        .is_err()
                    {
                        warn!(facility = %self.facility, "Reconciler gone, polling stops");
                        break;
                    }
                },
                Ok(None) => {},
                Err(e) => warn!(facility = %self.facility, "Alert poll failed, retrying next tick: {}", e),
            }
        }

        info!(facility = %self.facility, epoch = self.epoch, "Polling stopped");
    }

    /// One fetch and diff
    pub async fn poll_once(&self, cursor: &mut FeedCursor) -> ResponderResult<Option<Alert>> {
        let payloads = self.feed.fetch_alerts(&self.facility).await?;
        let count = payloads.len();
        let first_fetch = !cursor.is_seeded();
        let observation = cursor.observe(payloads);

        if first_fetch {
            debug!(
                facility = %self.facility,
                count,
                last_seen = ?cursor.last_seen(),
                "Seeded alert cursor"
            );
        }
        if observation.superseded > 0 {
            warn!(
                facility = %self.facility,
                superseded = observation.superseded,
                "Several new alerts since last poll, only the newest is presented"
            );
        }
        Ok(observation.new_alert)
    }

    fn jitter_delay(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(timestamp: &str) -> AlertPayload {
        AlertPayload::from_value(json!({
            "timestamp": timestamp,
            "body": "Smoke in the east wing",
            "priority": 2
        }))
        .unwrap()
    }

    #[test]
    fn test_first_fetch_only_seeds() {
        let mut cursor = FeedCursor::new();
        let observation = cursor.observe(vec![payload("2025-03-01T10:00:00")]);
        assert!(observation.new_alert.is_none());
        assert_eq!(cursor.last_seen(), Some(AlertKey::parse("2025-03-01T10:00:00").unwrap()));
    }

    #[test]
    fn test_empty_first_fetch_then_alert() {
        let mut cursor = FeedCursor::new();
        assert!(cursor.observe(Vec::new()).new_alert.is_none());
        assert!(cursor.last_seen().is_none());
        assert!(cursor.is_seeded());

        let observation = cursor.observe(vec![payload("2025-03-01T10:00:00")]);
        assert!(observation.new_alert.is_some());
        assert!(cursor.observe(vec![payload("2025-03-01T10:00:00")]).new_alert.is_none());
    }

    #[test]
    fn test_newest_only_with_superseded_count() {
        let mut cursor = FeedCursor::new();
        cursor.observe(vec![payload("2025-03-01T10:00:00")]);

        let observation = cursor.observe(vec![
            payload("2025-03-01T10:00:09"),
            payload("2025-03-01T10:00:05"),
            payload("2025-03-01T10:00:03"),
            payload("2025-03-01T10:00:00"),
        ]);
        let alert = observation.new_alert.unwrap();
        assert_eq!(alert.key, AlertKey::parse("2025-03-01T10:00:09").unwrap());
        assert_eq!(observation.superseded, 2);
    }

    #[test]
    fn test_last_seen_never_moves_back() {
        let mut cursor = FeedCursor::new();
        cursor.observe(vec![payload("2025-03-01T10:00:05")]);

        let observation = cursor.observe(vec![payload("2025-03-01T10:00:01")]);
        assert!(observation.new_alert.is_none());
        assert_eq!(cursor.last_seen(), Some(AlertKey::parse("2025-03-01T10:00:05").unwrap()));
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_malformed_newest_still_advances() {
        let mut cursor = FeedCursor::new();
        cursor.observe(Vec::new());

        let bodyless = AlertPayload {
            timestamp: Some("2025-03-01T10:00:00".into()),
            ..AlertPayload::default()
        };
        assert!(cursor.observe(vec![bodyless]).new_alert.is_none());
        assert!(logs_contain("Dropping malformed alert from feed"));
        assert!(cursor.observe(vec![payload("2025-03-01T10:00:00")]).new_alert.is_none());
    }
}
