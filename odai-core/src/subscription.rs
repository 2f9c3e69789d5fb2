//! Channel subscription tracking.

use tokio::sync::watch;

use crate::channel_id::ChannelId;
use crate::sync::ConnectionManager;

/// Holds the current channel and keeps the relay told about it.
///
/// The target lives on the [`ConnectionManager`], which replays it every
/// time the connection opens; this controller is the one place the rest of
/// the client changes it, and lets collaborators watch for changes (to
/// update a URL fragment or a window title, say).
#[derive(Debug)]
pub struct SubscriptionController {
    manager: ConnectionManager,
    current: watch::Sender<ChannelId>,
}

impl SubscriptionController {
    pub fn new(manager: ConnectionManager) -> Self {
        let (current, _) = watch::channel(manager.target());
        Self { manager, current }
    }

    /// Makes `id` the channel to join.
    ///
    /// On an open connection the subscribe message goes out at once;
    /// otherwise it is sent when the connection next opens. Returns true if
    /// it was sent now.
    pub fn set_target(&self, id: ChannelId) -> bool {
        let sent = self.manager.subscribe(id.clone());
        if !sent {
            tracing::debug!(channel = %id, "Subscription deferred until connected");
        }
        self.current.send_replace(id);
        sent
    }

    pub fn current(&self) -> ChannelId {
        self.current.borrow().clone()
    }

    /// Watches the current channel.
    pub fn changes(&self) -> watch::Receiver<ChannelId> {
        self.current.subscribe()
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }
}
