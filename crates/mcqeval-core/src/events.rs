//! Live progress events and their fan-out publisher.
//!
//! Delivery is best-effort: observers only see events published while they
//! are registered, and a slow observer that falls behind the channel
//! capacity loses the oldest events instead of holding up the run.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::Domain;

/// Default number of events buffered per observer.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Outcome of evaluating one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEvent {
    pub domain: Domain,
    pub question: String,
    /// Normalized label, or "" when the reply named none.
    pub answer: String,
    /// Round-trip time of the answer-service call in milliseconds.
    pub response_time: u64,
    /// Set when the answer service failed for this question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run lifecycle signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum LifecycleEvent {
    /// A quick run is about to process a domain's sample.
    DomainStart { domain: Domain, count: usize },
    /// A full run processed every question.
    Done,
    /// A quick run processed every sampled question.
    QuickDone,
    /// The run observed a stop request and exited.
    Stopped,
    /// Observers should discard their accumulated log.
    Reset,
}

/// A message broadcast to live observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    Lifecycle(LifecycleEvent),
    Answer(AnswerEvent),
}

impl From<LifecycleEvent> for ProgressEvent {
    fn from(event: LifecycleEvent) -> Self {
        ProgressEvent::Lifecycle(event)
    }
}

impl From<AnswerEvent> for ProgressEvent {
    fn from(event: AnswerEvent) -> Self {
        ProgressEvent::Answer(event)
    }
}

/// Fan-out channel to every registered observer.
///
/// Cloning the publisher yields another handle to the same channel.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<ProgressEvent>,
}

/// A registered observer. Dropping it unregisters.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<ProgressEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new observer. It receives events published from now on.
    pub fn register(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Send an event to every current observer. Never fails.
    pub fn publish(&self, event: impl Into<ProgressEvent>) {
        let event = event.into();
        if self.sender.send(event).is_err() {
            tracing::trace!("no observers registered, event dropped");
        }
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the publisher is gone.
    ///
    /// Events missed because this observer lagged are skipped with a warning.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("observer lagged behind, {missed} events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!("observer lagged behind, {missed} events skipped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Explicitly unregister this observer.
    pub fn unregister(self) {}
}
