//! The scheduler loop (spec.md §4.5): claim ready entries up to the
//! concurrency and rate limits, hand each to the dispatcher, drain
//! finished attempts, sweep stale `Running` rows and prune old terminal
//! ones, then sleep until the next poll tick or an out-of-band wake.
//!
//! Grounded on `hook-worker::worker::WebhookWorker::run`'s shape (a
//! `Semaphore`-bounded spawn loop with a liveness report every tick), with
//! the teacher's bare `Semaphore` swapped for a `JoinSet` so the loop can
//! drain completions without holding permits across `.await` points, and
//! the teacher's plain polling sleep replaced with a `tokio::select!`
//! against the force-start `Notify` from `crate::registry`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use queue_core::{QueueStatusUpdate, RateLimiter, ResolvedConfig, Store};
use tokio::task::JoinSet;

use crate::dispatcher::Dispatcher;
use crate::registry::QueueHandle;

pub struct Scheduler {
    store: Arc<Store>,
    config: ResolvedConfig,
    dispatcher: Arc<Dispatcher>,
    rate_limiter: RateLimiter,
    liveness: queue_core::health::HealthHandle,
    handle: Arc<QueueHandle>,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        config: ResolvedConfig,
        dispatcher: Arc<Dispatcher>,
        liveness: queue_core::health::HealthHandle,
        handle: Arc<QueueHandle>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit.max_events, config.rate_limit.window);
        Self {
            store,
            config,
            dispatcher,
            rate_limiter,
            liveness,
            handle,
        }
    }

    pub async fn run(self) -> ! {
        let mut active: JoinSet<()> = JoinSet::new();
        let mut last_sweep = Instant::now() - self.config.max_processing_time;

        if self.config.processing_startup_delay > Duration::ZERO {
            tokio::time::sleep(self.config.processing_startup_delay).await;
        }

        loop {
            self.liveness.report_healthy().await;

            self.run_forced(&mut active).await;

            if last_sweep.elapsed() >= self.config.max_processing_time {
                self.sweep().await;
                last_sweep = Instant::now();
            }

            self.fill(&mut active).await;

            while let Some(joined) = active.try_join_next() {
                if let Err(join_error) = joined {
                    tracing::error!(%join_error, "dispatch task panicked");
                }
            }

            self.report_status(active.len()).await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.handle.wake.notified() => {}
            }
        }
    }

    /// Publish this tick's declared config and live readings for the admin
    /// surface's `GET /queues` snapshot (spec.md §4.7). Best-effort: a
    /// failed write here is logged, not fatal, since it only affects
    /// observability, not dispatch.
    async fn report_status(&self, running_count: usize) {
        let status = QueueStatusUpdate {
            queue_name: self.config.queue_name.clone(),
            description: self.config.description.clone(),
            rate_limit: self.config.rate_limit.to_string(),
            backoff: self.config.backoff.to_string(),
            concurrency: self.config.max_concurrent_dispatches as i64,
            max_retries: self.config.max_retries as i64,
            current_rate: self.rate_limiter.event_count().await as f64,
            running_count: running_count as i64,
            runner_active: true,
            crash_message: None,
        };

        if let Err(error) = self.store.upsert_queue_status(&status, Utc::now()).await {
            tracing::error!(%error, queue = %self.config.queue_name, "failed to publish queue status");
        }
    }

    /// Dispatch every force-started entry right now, regardless of
    /// concurrency headroom or rate-limiter wait time, per spec.md §4.5's
    /// "start them immediately ... but count each in the rate limiter"
    /// force-start step. Runs outside `fill`'s capacity/rate gates on
    /// purpose: a forced entry under a saturated queue must not wait for
    /// the next tick's `fill` to happen to have room.
    async fn run_forced(&self, active: &mut JoinSet<()>) {
        for entry_id in self.handle.take_forced() {
            let entry = match self.store.claim_forced(entry_id, Utc::now()).await {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(error) => {
                    tracing::error!(%error, entry_id, "force-start failed");
                    continue;
                }
            };

            self.rate_limiter.add_event(1).await;
            let dispatcher = self.dispatcher.clone();
            active.spawn(async move { dispatcher.run(entry).await });
        }
    }

    async fn sweep(&self) {
        let now = Utc::now();
        let cutoff = now
            - chrono::Duration::from_std(self.config.max_processing_time)
                .unwrap_or(chrono::Duration::zero());

        match self
            .store
            .reap_stale_running(&self.config.queue_name, cutoff, now)
            .await
        {
            Ok(0) => {}
            Ok(n) => tracing::warn!(queue = %self.config.queue_name, count = n, "reclaimed stale running entries"),
            Err(error) => tracing::error!(%error, "failed to reap stale running entries"),
        }

        let prune_cutoff = now
            - chrono::Duration::from_std(self.config.prune_after).unwrap_or(chrono::Duration::zero());
        match self.store.prune_terminal(&self.config.queue_name, prune_cutoff).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(queue = %self.config.queue_name, count = n, "pruned terminal entries"),
            Err(error) => tracing::error!(%error, "failed to prune terminal entries"),
        }
    }

    async fn fill(&self, active: &mut JoinSet<()>) {
        let capacity = self.config.max_concurrent_dispatches.saturating_sub(active.len());
        if capacity == 0 {
            return;
        }

        if self.rate_limiter.wait_time().await > Duration::ZERO {
            return;
        }

        let claimed = match self
            .store
            .claim_ready(&self.config.queue_name, Utc::now(), capacity as i64)
            .await
        {
            Ok(entries) => entries,
            Err(error) => {
                tracing::error!(%error, "failed to claim ready entries");
                return;
            }
        };

        for entry in claimed {
            self.rate_limiter.add_event(1).await;
            let dispatcher = self.dispatcher.clone();
            active.spawn(async move { dispatcher.run(entry).await });
        }
    }
}
