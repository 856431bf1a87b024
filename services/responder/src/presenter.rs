//! Terminal implementations of the presentation seams

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use errors::ResponderResult;
use tracing::{info, warn};

use crate::domain::{Alert, Resolution};
use crate::reconciler::{ClearReason, DeliveryChannel, Presenter};
use crate::resolver::IncidentResolver;
use crate::worker::{NotificationCard, Notifier, SurfaceLauncher};

/// Logs the alert banner, rings the bell and looks up nearby facilities
pub struct ConsolePresenter {
    resolver: Arc<dyn IncidentResolver>,
    preview_chars: usize,
}

impl ConsolePresenter {
    pub fn new(resolver: Arc<dyn IncidentResolver>, preview_chars: usize) -> Self {
        Self {
            resolver,
            preview_chars,
        }
    }
}

impl Presenter for ConsolePresenter {
    fn present(&self, alert: &Alert, channel: DeliveryChannel) {
        if alert.play_sound {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(b"\x07").and_then(|()| stdout.flush());
        }

        warn!(
            alert = %alert.key,
            %channel,
            priority = alert.priority.label(),
            "{}",
            alert.title
        );
        info!(
            "Type: {} | Location: {} | Emotion: {}",
            alert.emergency_type,
            if alert.location.is_empty() { "Not specified" } else { alert.location.as_str() },
            alert.emotion
        );
        info!("\"{}\"", alert.preview(self.preview_chars));

        if alert.location.is_empty() {
            return;
        }

        let resolver = self.resolver.clone();
        let key = alert.key;
        let location = alert.location.clone();
        tokio::spawn(async move {
            match resolver.resolve(&location).await {
                Resolution::Found(incident) if incident.facilities.is_empty() => {
                    info!(alert = %key, "No emergency facilities found near {}", incident.display_name);
                },
                Resolution::Found(incident) => {
                    info!(alert = %key, "Nearest facilities to {}:", incident.display_name);
                    for (rank, facility) in incident.facilities.iter().enumerate() {
                        info!(
                            "  {}. {} ({}) {:.1} km",
                            rank + 1,
                            facility.name,
                            facility.category_label,
                            facility.distance_km
                        );
                    }
                },
                Resolution::NotFound => info!(alert = %key, "Location '{}' not found on map", location),
            }
        });
    }

    fn clear(&self, alert: &Alert, reason: ClearReason) {
        info!(alert = %alert.key, reason = ?reason, "Alert cleared");
    }
}

/// Notification surface that writes to the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, card: &NotificationCard) {
        let actions: Vec<&str> = card.actions.iter().map(|a| a.title()).collect();
        warn!(tag = card.tag, actions = ?actions, "[notification] {}: {}", card.title, card.body);
    }

    fn close(&self, tag: &str) {
        info!(tag, "[notification] closed");
    }
}

/// The terminal session is the only surface and is always open
pub struct TerminalSurface;

#[async_trait]
impl SurfaceLauncher for TerminalSurface {
    async fn focus_or_open(&self) -> ResponderResult<()> {
        info!("Foreground surface is the terminal session");
        Ok(())
    }
}
