//! Drains the send queue to the HTTP transport
//!
//! A single consumer task takes requests off the bounded queue and
//! dispatches them, publishing the outcome of the most recent post for the
//! coordinator to read. Running independently means a slow network stalls
//! the queue, not the fetch cadence; the fetcher sheds what no longer fits.

use crate::transport::{HttpRequest, HttpTransport};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Result of the most recent post attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// The service accepted the payload
    Delivered {
        subscribed: bool,
        /// Service override for the next post delay
        next_delay: Option<Duration>,
    },
    /// Non-2xx status or transport failure
    Failed,
}

/// Shared cell holding the last post outcome
///
/// Written only by the sender task, read by the coordinator at phase
/// boundaries.
#[derive(Debug)]
pub struct PostStatus(Mutex<PostOutcome>);

impl PostStatus {
    #[must_use]
    pub fn new() -> Self {
        Self(Mutex::new(PostOutcome::Delivered {
            subscribed: true,
            next_delay: None,
        }))
    }

    pub fn set(&self, outcome: PostOutcome) {
        *self.lock() = outcome;
    }

    #[must_use]
    pub fn last(&self) -> PostOutcome {
        self.lock().clone()
    }

    /// Forget results from a previous post phase
    pub fn reset(&self) {
        self.set(PostOutcome::Delivered {
            subscribed: true,
            next_delay: None,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PostOutcome> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for PostStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-consumer loop over the send queue
pub struct DataSender {
    transport: Arc<dyn HttpTransport>,
    queue: mpsc::Receiver<HttpRequest>,
    status: Arc<PostStatus>,
}

impl DataSender {
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        queue: mpsc::Receiver<HttpRequest>,
        status: Arc<PostStatus>,
    ) -> Self {
        Self {
            transport,
            queue,
            status,
        }
    }

    /// Consume the queue until every producer is gone
    pub async fn run(mut self) {
        while let Some(request) = self.queue.recv().await {
            match self.transport.send(request).await {
                Ok(response) if response.is_success() => {
                    self.status.set(PostOutcome::Delivered {
                        subscribed: response.subscribed(),
                        next_delay: response.polling_hint(),
                    });
                }
                Ok(response) => {
                    debug!(status = response.status(), "post rejected");
                    self.status.set(PostOutcome::Failed);
                }
                Err(err) => {
                    debug!(%err, "post failed");
                    self.status.set(PostOutcome::Failed);
                }
            }
        }
        debug!("data sender stopped");
    }
}

impl std::fmt::Debug for DataSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSender").finish_non_exhaustive()
    }
}
