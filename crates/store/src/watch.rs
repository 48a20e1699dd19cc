//! Watch streams over store changes.

use tokio::sync::broadcast;

use crate::error::{Error, Result};

/// A change observed on a stored object.
#[derive(Debug, Clone)]
pub enum WatchEvent<R> {
    /// Object was created.
    Added(R),
    /// Object was written; carries the previous and the new state.
    Modified { old: R, new: R },
    /// Object was removed from the store. Carries its last state.
    Deleted(R),
}

impl<R> WatchEvent<R> {
    /// The most recent state of the object.
    pub const fn object(&self) -> &R {
        match self {
            Self::Added(obj) | Self::Deleted(obj) => obj,
            Self::Modified { new, .. } => new,
        }
    }

    /// Event type name, for logging.
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Modified { .. } => "modified",
            Self::Deleted(_) => "deleted",
        }
    }
}

/// Subscription handle for receiving watch events.
pub struct WatchStream<R> {
    receiver: broadcast::Receiver<WatchEvent<R>>,
}

impl<R: Clone> WatchStream<R> {
    pub(crate) const fn new(receiver: broadcast::Receiver<WatchEvent<R>>) -> Self {
        Self { receiver }
    }

    /// Receive the next event.
    ///
    /// # Errors
    ///
    /// Returns `Error::WatchLagged` when events were dropped because the
    /// receiver fell behind (the caller should relist), and
    /// `Error::ChannelClosed` when the store is gone.
    pub async fn recv(&mut self) -> Result<WatchEvent<R>> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(skipped) => Error::WatchLagged { skipped },
            broadcast::error::RecvError::Closed => Error::ChannelClosed,
        })
    }
}
