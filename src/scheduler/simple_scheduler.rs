//! Recurring execution of sync passes
//!
//! A pass is never started while the previous one is still running, and an
//! optional wall clock budget bounds each pass.

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Run one job under an optional timeout
pub async fn run_with_timeout<F, Fut>(job: &F, run_timeout: Option<Duration>) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    match run_timeout {
        Some(limit) => tokio::time::timeout(limit, job())
            .await
            .map_err(|_| anyhow!("Sync pass exceeded its time budget of {:?}", limit))?,
        None => job().await,
    }
}

pub struct SimpleTaskManager {
    shutdown_handles: Vec<JoinHandle<()>>,
}

impl SimpleTaskManager {
    pub fn new() -> Self {
        Self {
            shutdown_handles: Vec::new(),
        }
    }

    /// Start the sync task with overlap protection
    pub fn start_sync_task<F, Fut>(
        &mut self,
        every: Duration,
        run_timeout: Option<Duration>,
        job: F,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let sync_running = Arc::new(Mutex::new(()));
        let job = Arc::new(job);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                // Try to acquire lock - if already running, skip this cycle
                let Ok(guard) = sync_running.clone().try_lock_owned() else {
                    warn!("Sync task still running, skipping this cycle");
                    continue;
                };

                let job = job.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    info!("Starting sync cycle");
                    match run_with_timeout(job.as_ref(), run_timeout).await {
                        Ok(()) => info!("Sync cycle completed successfully"),
                        Err(e) => error!("Sync cycle failed: {:#}", e),
                    }
                });
            }
        });

        self.shutdown_handles.push(handle);
        info!("Sync task started, interval {:?}", every);
    }

    /// Stop scheduling further cycles
    pub async fn shutdown(self) {
        info!("Shutting down task manager...");

        for handle in self.shutdown_handles {
            handle.abort();
            let _ = handle.await;
        }

        info!("Task manager shutdown complete");
    }
}

impl Default for SimpleTaskManager {
    fn default() -> Self {
        Self::new()
    }
}
