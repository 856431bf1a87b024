//! Foreground session
//!
//! Owns the current facility selection and wires the components together:
//! selecting a facility starts polling (and makes push opt-in possible),
//! clearing it stops polling and resets the reconciler in one step.

use std::sync::Arc;
use std::time::Duration;

use errors::{ResponderError, ResponderResult};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::AlertFeed;
use crate::channel::{ChannelManager, ChannelState, PushOutcome};
use crate::config::PollingConfig;
use crate::directory::DirectoryClient;
use crate::domain::Facility;
use crate::poller::PollLoop;
use crate::reconciler::{ReconcilerHandle, ReconcilerSnapshot};
use crate::state_store::StateStore;

struct Selection {
    facility: Facility,
    token: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub facility: Option<String>,
    pub epoch: u64,
    #[serde(skip)]
    pub channel: ChannelState,
    pub push_available: bool,
    pub reconciler: ReconcilerSnapshot,
}

pub struct Session {
    directory: Arc<DirectoryClient>,
    feed: Arc<dyn AlertFeed>,
    channel: ChannelManager,
    reconciler: ReconcilerHandle,
    store: StateStore,
    interval: Duration,
    jitter: Duration,
    token: CancellationToken,
    selection: Option<Selection>,
    epoch: u64,
}

impl Session {
    pub fn new(
        directory: Arc<DirectoryClient>,
        feed: Arc<dyn AlertFeed>,
        channel: ChannelManager,
        reconciler: ReconcilerHandle,
        store: StateStore,
        polling: &PollingConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            directory,
            feed,
            channel,
            reconciler,
            store,
            interval: polling.interval(),
            jitter: polling.jitter(),
            token,
            selection: None,
            epoch: 0,
        }
    }

    pub fn selected(&self) -> Option<&Facility> {
        self.selection.as_ref().map(|s| &s.facility)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn directory(&self) -> &DirectoryClient {
        &self.directory
    }

    pub fn reconciler(&self) -> &ReconcilerHandle {
        &self.reconciler
    }

    pub fn channel(&self) -> &ChannelManager {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut ChannelManager {
        &mut self.channel
    }

    /// Select `name`, replacing any current selection
    pub async fn select_facility(&mut self, name: &str) -> ResponderResult<Facility> {
        let facility = self
            .directory
            .find(name)
            .await
            .ok_or_else(|| ResponderError::NotFound(format!("facility '{}'", name.trim())))?;

        self.stop_polling().await;
        self.epoch += 1;
        self.reconciler.reset(self.epoch).await?;

        if let Err(e) = self.store.remember_facility(&facility.name).await {
            warn!(facility = %facility.name, "Failed to persist selection: {}", e);
        }

        let token = self.token.child_token();
        let task = PollLoop::new(
            self.feed.clone(),
            facility.name.clone(),
            self.epoch,
            self.interval,
            self.reconciler.clone(),
        )
        .with_jitter(self.jitter)
        .spawn(token.clone());

        info!(facility = %facility.name, epoch = self.epoch, "Facility selected");
        self.selection = Some(Selection {
            facility: facility.clone(),
            token,
            task,
        });
        Ok(facility)
    }

    /// Stop polling and reset the reconciler; forgets the persisted selection
    pub async fn clear_selection(&mut self) -> ResponderResult<()> {
        let previous = self.stop_polling().await;
        self.epoch += 1;
        self.reconciler.reset(self.epoch).await?;

        if let Err(e) = self.store.forget_facility().await {
            warn!("Failed to clear persisted selection: {}", e);
        }
        if let Some(facility) = previous {
            info!(facility = %facility.name, "Facility selection cleared");
        }
        Ok(())
    }

    /// Explicit operator opt-in to push for the selected facility
    pub async fn enable_push(&mut self) -> ResponderResult<PushOutcome> {
        let name = self
            .selected()
            .map(|f| f.name.clone())
            .ok_or_else(|| ResponderError::validation("facility", "select a facility first"))?;
        Ok(self.channel.activate(&name).await)
    }

    /// Push service reported the subscription endpoint gone; polling carries on
    pub fn push_endpoint_rejected(&mut self, status: u16) -> ResponderResult<()> {
        match status {
            404 | 410 => {
                self.channel
                    .invalidate(&format!("push service answered {}", status));
                Ok(())
            },
            other => Err(ResponderError::validation(
                "status",
                format!("{} does not invalidate a subscription, expected 404 or 410", other),
            )),
        }
    }

    pub async fn dismiss(&self) -> ResponderResult<()> {
        self.reconciler.dismiss().await
    }

    /// Re-select the persisted facility when it is still in the directory
    pub async fn resume(&mut self) -> ResponderResult<Option<Facility>> {
        let Some(name) = self.store.load().await.last_facility else {
            return Ok(None);
        };

        if self.directory.find(&name).await.is_none() {
            warn!(facility = %name, "Persisted facility no longer in directory");
            return Ok(None);
        }

        info!(facility = %name, "Resuming previous session");
        self.select_facility(&name).await.map(Some)
    }

    pub async fn status(&self) -> ResponderResult<SessionStatus> {
        Ok(SessionStatus {
            facility: self.selected().map(|f| f.name.clone()),
            epoch: self.epoch,
            channel: self.channel.state(),
            push_available: self.channel.push_available(),
            reconciler: self.reconciler.snapshot().await?,
        })
    }

    /// Stop polling without touching persisted state; used on shutdown
    pub async fn stop(&mut self) {
        if let Some(facility) = self.stop_polling().await {
            info!(facility = %facility.name, "Session stopped");
        }
    }

    async fn stop_polling(&mut self) -> Option<Facility> {
        let selection = self.selection.take()?;
        selection.token.cancel();
        if let Err(e) = selection.task.await {
            if !e.is_cancelled() {
                warn!(facility = %selection.facility.name, "Poll loop ended abnormally: {}", e);
            }
        }
        Some(selection.facility)
    }
}
