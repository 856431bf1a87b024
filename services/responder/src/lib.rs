//! Responder
//!
//! Delivers emergency alerts to a registered response facility through two
//! independent paths, a push channel and a periodic poll, and merges them into
//! one deduplicated alert timeline. Each presented alert is augmented with the
//! nearest emergency facilities around the reported location.
//!
//! ```text
//! ┌──────────────┐  select  ┌──────────────┐  poll events  ┌──────────────┐
//! │  Directory   │─────────►│   Session    │──────────────►│  Reconciler  │
//! └──────────────┘          │  PollLoop    │               │   (actor)    │
//!                           │  Channel Mgr │               └──────┬───────┘
//!                           └──────────────┘                      │ present
//! ┌──────────────┐  push events (after SurfaceReady)               ▼
//! │  PushWorker  │────────────────────────────────────────►┌──────────────┐
//! └──────────────┘                                         │  Presenter   │──► Resolver
//!                                                          └──────────────┘
//! ```

pub mod backend;
pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod console;
pub mod directory;
pub mod domain;
pub mod poller;
pub mod presenter;
pub mod reconciler;
pub mod resolver;
pub mod session;
pub mod state_store;
pub mod worker;

pub use channel::{ChannelManager, ChannelState, PushOutcome};
pub use config::ResponderConfig;
pub use directory::DirectoryClient;
pub use reconciler::{DeliveryChannel, Phase, ReconcilerActor, ReconcilerHandle};
pub use session::Session;
pub use worker::{PushWorker, PushWorkerHandle};
