//! Application activity notifications.
//!
//! Long-lived caches subscribe to these to refresh themselves whenever the
//! application returns to the foreground.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 16;

/// Lifecycle transitions of the hosting application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActivityEvent {
    /// The application moved to the foreground.
    BecameActive,

    /// The application is about to move to the background.
    ResignedActive,
}

/// A source of "application became active" signals.
pub trait ActivitySource: Send + Sync + 'static {
    /// Returns a stream yielding once per activation.
    ///
    /// The stream ends when the source shuts down.
    fn became_active(&self) -> BoxStream<'static, ()>;
}

/// In-process activity source backed by a broadcast channel.
#[derive(Clone, Debug)]
pub struct ActivityNotifier {
    sender: broadcast::Sender<ActivityEvent>,
}

impl ActivityNotifier {
    /// Creates a new notifier with the default backlog.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a new notifier that buffers up to `capacity` events per listener.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self { sender }
    }

    /// Publishes an event, returning how many listeners received it.
    pub fn notify(&self, event: ActivityEvent) -> usize {
        let delivered = self.sender.send(event).unwrap_or(0);
        trace!(?event, delivered, "published activity event");
        delivered
    }

    /// Subscribes to every event published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.sender.subscribe()
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ActivityNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivitySource for ActivityNotifier {
    fn became_active(&self) -> BoxStream<'static, ()> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|event| async move {
                match event {
                    Ok(ActivityEvent::BecameActive) => Some(()),
                    Ok(ActivityEvent::ResignedActive) => None,
                    // Missed events still mean the app was activated at least once.
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        trace!(skipped, "activity listener lagged");
                        Some(())
                    }
                }
            })
            .boxed()
    }
}

impl<S> ActivitySource for std::sync::Arc<S>
where
    S: ActivitySource,
{
    fn became_active(&self) -> BoxStream<'static, ()> {
        (**self).became_active()
    }
}
