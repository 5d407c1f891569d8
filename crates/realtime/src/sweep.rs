//! Periodic maintenance loops
//!
//! A fast sweep demotes stale presence and clears expired typing indicators;
//! a slow cleanup reaps aged queue entries and purges long-gone presence
//! records. Both passes are idempotent and safe to run concurrently with
//! live traffic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::RealtimeConfig;
use crate::offline_queue::OfflineMessageQueue;
use crate::presence::{PresenceTracker, PresenceTransition};
use crate::typing::TypingTracker;

/// Receives presence transitions discovered by the sweep so they can be
/// fanned out to connected clients
#[async_trait]
pub trait PresenceListener: Send + Sync {
    async fn presence_changed(&self, transitions: Vec<PresenceTransition>);
}

pub struct Sweeper {
    presence: Arc<PresenceTracker>,
    typing: Arc<TypingTracker>,
    queue: Arc<OfflineMessageQueue>,
    sweep_interval: Duration,
    cleanup_interval: Duration,
}

impl Sweeper {
    pub fn new(
        presence: Arc<PresenceTracker>,
        typing: Arc<TypingTracker>,
        queue: Arc<OfflineMessageQueue>,
        config: &RealtimeConfig,
    ) -> Self {
        Self {
            presence,
            typing,
            queue,
            sweep_interval: config.sweep_interval,
            cleanup_interval: config.cleanup_interval,
        }
    }

    /// Spawn both loops; they stop when the returned handle shuts down
    pub fn start(self, listener: Arc<dyn PresenceListener>) -> SweeperHandle {
        let sweep = {
            let presence = self.presence.clone();
            let typing = self.typing.clone();
            let interval = self.sweep_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    run_sweep(&presence, &typing, listener.as_ref()).await;
                }
            })
        };

        let cleanup = {
            let presence = self.presence;
            let queue = self.queue;
            let interval = self.cleanup_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    run_cleanup(&presence, &queue).await;
                }
            })
        };

        SweeperHandle {
            tasks: vec![sweep, cleanup],
        }
    }
}

async fn run_sweep(
    presence: &PresenceTracker,
    typing: &TypingTracker,
    listener: &dyn PresenceListener,
) {
    let transitions = presence.sweep_stale().await;
    if !transitions.is_empty() {
        info!(transitions = transitions.len(), "presence sweep demoted stale users");
        listener.presence_changed(transitions).await;
    }
    let expired = typing.sweep_expired().await;
    if expired > 0 {
        debug!(expired, "typing sweep removed expired indicators");
    }
}

async fn run_cleanup(presence: &PresenceTracker, queue: &OfflineMessageQueue) {
    let reaped = queue.reap_expired().await;
    let purged = presence.purge_stale().await;
    if reaped > 0 || purged > 0 {
        info!(reaped, purged, "cleanup removed aged realtime state");
    }
}

/// Owns the spawned loops; dropping it stops them
pub struct SweeperHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
