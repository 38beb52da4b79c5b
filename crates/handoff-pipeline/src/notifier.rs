//! Event Notifier: topic-based publish/subscribe scoped to one process
//!
//! Each subscription owns an unbounded queue drained by its own task, so
//! `publish` never waits on a handler and a subscriber only ever sees its
//! own backlog. Handlers run on the blocking pool one event at a time,
//! which keeps per-story emission order. A handler error or panic is
//! logged and the event is not redelivered.

use crate::events::{PipelineEvent, TopicPattern};
use crate::journal::EventJournal;
use handoff_core::HandoffError;
use parking_lot::RwLock;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

type Handler = Arc<dyn Fn(&PipelineEvent) -> HandlerResult + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscription {
    id: SubscriptionId,
    pattern: TopicPattern,
    queue: mpsc::UnboundedSender<PipelineEvent>,
}

pub struct EventNotifier {
    subscriptions: RwLock<Vec<Subscription>>,
    journal: Arc<EventJournal>,
    next_id: AtomicU64,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::with_journal(Arc::new(EventJournal::new()))
    }

    pub fn with_journal(journal: Arc<EventJournal>) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            journal,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn journal(&self) -> &Arc<EventJournal> {
        &self.journal
    }

    /// Register `handler` for every topic matching `pattern`.
    ///
    /// Must be called from within a tokio runtime; the delivery task is
    /// spawned on it.
    pub fn subscribe<F>(&self, pattern: &str, handler: F) -> Result<SubscriptionId, HandoffError>
    where
        F: Fn(&PipelineEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let pattern = TopicPattern::new(pattern)?;
        let runtime = Handle::try_current()
            .map_err(|e| HandoffError::Config(format!("subscribe outside a tokio runtime: {}", e)))?;

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (queue, receiver) = mpsc::unbounded_channel();
        runtime.spawn(deliver(id, receiver, Arc::new(handler)));

        debug!(subscription = %id, pattern = %pattern, "subscribed");
        self.subscriptions.write().push(Subscription { id, pattern, queue });
        Ok(id)
    }

    /// Drop a subscription. Events already queued for it are still delivered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        before != subscriptions.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Record `event` and queue it for every matching subscriber
    pub fn publish(&self, event: PipelineEvent) {
        let subscriptions = self.subscriptions.read();
        for subscription in subscriptions.iter().filter(|s| s.pattern.matches(&event.topic)) {
            if subscription.queue.send(event.clone()).is_err() {
                warn!(
                    subscription = %subscription.id,
                    story_id = %event.story_id,
                    topic = %event.topic,
                    "subscriber task gone, event not delivered"
                );
            }
        }
        drop(subscriptions);
        self.journal.record(event);
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

async fn deliver(id: SubscriptionId, mut receiver: mpsc::UnboundedReceiver<PipelineEvent>, handler: Handler) {
    while let Some(event) = receiver.recv().await {
        let story_id = event.story_id.clone();
        let topic = event.topic;
        let sequence = event.sequence;
        let handler = Arc::clone(&handler);

        match tokio::task::spawn_blocking(move || handler(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(
                subscription = %id,
                story_id = %story_id,
                topic = %topic,
                sequence,
                error = %err,
                "subscriber failed"
            ),
            Err(join) => warn!(
                subscription = %id,
                story_id = %story_id,
                topic = %topic,
                sequence,
                error = %join,
                "subscriber panicked"
            ),
        }
    }
    debug!(subscription = %id, "delivery stopped");
}
