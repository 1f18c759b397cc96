//! Periodic cleanup of abandoned login states.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::shared::error::Result;
use crate::state::store::StateStore;

pub struct StateReaper {
    store: Arc<dyn StateStore>,
    interval: Duration,
}

impl StateReaper {
    pub fn new(store: Arc<dyn StateStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    pub async fn run_once(&self) -> Result<u64> {
        let removed = self.store.purge_expired().await?;
        if removed > 0 {
            info!(removed, "Reaped expired login states");
        } else {
            debug!("No expired login states to reap");
        }
        Ok(removed)
    }

    /// Run forever on the current runtime. Abort the handle to stop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    error!(error = %e, "Login state reaper pass failed");
                }
            }
        })
    }
}
