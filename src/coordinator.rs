//! Ping/post state machine
//!
//! One long-lived task alternates between keep-alive pings and
//! high-frequency posts, degrading to a backoff pause when posts fail
//! repeatedly. The coordinator is the single writer of the subscription
//! state; the ping and data senders only publish results for it to consume
//! at phase boundaries.

use crate::collector::{LiveMetricsCollector, Subscription};
use crate::config::LiveMetricsConfig;
use crate::fetcher::DataFetcher;
use crate::ping::PingSender;
use crate::sender::{PostOutcome, PostStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Probe on a slow cadence until the service subscribes
    Ping,
    /// Snapshot and post on a fast cadence while the service is watching
    Post,
    /// Pause after repeated post failures, then probe again
    ErrorBackoff,
}

/// Drives the ping/post alternation on a single background task
pub struct Coordinator {
    collector: LiveMetricsCollector,
    ping_sender: PingSender,
    fetcher: DataFetcher,
    post_status: Arc<PostStatus>,
    ping_interval: Duration,
    post_interval: Duration,
    wait_on_error: Duration,
    max_post_failures: u32,
    state: State,
    post_failures: u32,
}

impl Coordinator {
    #[must_use]
    pub fn new(
        collector: LiveMetricsCollector,
        ping_sender: PingSender,
        fetcher: DataFetcher,
        post_status: Arc<PostStatus>,
        config: &LiveMetricsConfig,
    ) -> Self {
        Self {
            collector,
            ping_sender,
            fetcher,
            post_status,
            ping_interval: config.ping_interval,
            post_interval: config.post_interval,
            wait_on_error: config.wait_on_error,
            max_post_failures: config.max_post_failures,
            state: State::Ping,
            post_failures: 0,
        }
    }

    /// Run until the shutdown channel fires or closes
    ///
    /// Each iteration sleeps for a state-dependent delay, then performs one
    /// action. The shutdown signal interrupts the sleep, so the task
    /// quiesces within one pending HTTP call.
    pub async fn run(mut self, mut shutdown: mpsc::Receiver<()>) {
        let mut delay = Duration::ZERO;
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                () = tokio::time::sleep(delay) => {}
            }

            delay = match self.state {
                State::Ping => self.ping_tick().await,
                State::Post => self.post_tick(),
                State::ErrorBackoff => {
                    self.state = State::Ping;
                    Duration::ZERO
                }
            };
        }
        debug!("coordinator stopped");
    }

    /// Probe the service; a subscribed verdict switches to the post phase
    async fn ping_tick(&mut self) -> Duration {
        let result = self.ping_sender.ping().await;
        if result.subscribed {
            self.collector.set_subscription(Subscription::On);
            self.post_status.reset();
            self.post_failures = 0;
            self.state = State::Post;
            self.post_interval
        } else {
            self.collector.set_subscription(Subscription::Off);
            result.next_delay.unwrap_or(self.ping_interval)
        }
    }

    /// Enqueue one payload, then steer by the last delivered post result
    fn post_tick(&mut self) -> Duration {
        self.fetcher.tick();

        match self.post_status.last() {
            PostOutcome::Delivered {
                subscribed: true,
                next_delay,
            } => {
                self.post_failures = 0;
                next_delay.unwrap_or(self.post_interval)
            }
            PostOutcome::Delivered {
                subscribed: false, ..
            } => {
                self.post_failures = 0;
                self.enter_ping()
            }
            PostOutcome::Failed => {
                self.post_failures += 1;
                if self.post_failures >= self.max_post_failures {
                    warn!(
                        failures = self.post_failures,
                        "live metrics posts keep failing, backing off"
                    );
                    self.post_failures = 0;
                    self.collector.set_subscription(Subscription::Off);
                    self.state = State::ErrorBackoff;
                    self.wait_on_error
                } else {
                    self.post_interval
                }
            }
        }
    }

    fn enter_ping(&mut self) -> Duration {
        self.collector.set_subscription(Subscription::Off);
        self.state = State::Ping;
        self.ping_interval
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("state", &self.state)
            .field("post_failures", &self.post_failures)
            .finish_non_exhaustive()
    }
}
