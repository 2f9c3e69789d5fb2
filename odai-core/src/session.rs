//! The collaborator-facing session.
//!
//! A [`Session`] wires one [`ConnectionManager`], one
//! [`SubscriptionController`] and one [`DrawSyncController`] together for a
//! single canvas window. A UI (or the CLI) feeds it pointer input, page
//! visibility and URL fragment changes, and reads back the surface, the
//! share URL and the window title.

use tokio::sync::watch;

use crate::canvas::{DrawSyncController, PointerEvent, Stroke, Surface, Viewport};
use crate::channel_id::{share_url, ChannelId};
use crate::subscription::SubscriptionController;
use crate::sync::{endpoint_url, ConnectionManager, RetryPolicy, Visibility};

/// Backing resolution of a new canvas, per side.
pub const DEFAULT_CANVAS_SIZE: u32 = 1920;

/// Prefix of the window title.
pub const TITLE_PREFIX: &str = "Odai";

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Relay origin, e.g. `https://odai.example.com`
    pub server_url: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Displayed size; `None` shows the canvas at its backing size
    pub viewport: Option<Viewport>,
    pub retry: RetryPolicy,
    pub stroke: Stroke,
}

impl SessionConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            canvas_width: DEFAULT_CANVAS_SIZE,
            canvas_height: DEFAULT_CANVAS_SIZE,
            viewport: None,
            retry: RetryPolicy::default(),
            stroke: Stroke::default(),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    server_url: String,
    manager: ConnectionManager,
    subscription: SubscriptionController,
    canvas: DrawSyncController,
}

impl Session {
    /// Joins `channel` and starts connecting.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: SessionConfig, channel: ChannelId) -> Self {
        let manager = ConnectionManager::new(endpoint_url(&config.server_url), config.retry);

        let surface = Surface::new(config.canvas_width, config.canvas_height);
        let viewport = config
            .viewport
            .unwrap_or_else(|| Viewport::native(&surface));
        let mut canvas = DrawSyncController::attach(&manager, surface, viewport);
        canvas.set_stroke(config.stroke);

        let subscription = SubscriptionController::new(manager.clone());
        subscription.set_target(channel.clone());

        tracing::info!(channel = %channel, server = %config.server_url, "Session started");
        manager.open();

        Self {
            server_url: config.server_url,
            manager,
            subscription,
            canvas,
        }
    }

    /// Moves to another channel on the same connection.
    ///
    /// The canvas is cleared first, dropping any stroke frame not yet sent,
    /// so the old drawing never reaches the new channel. Returns false if
    /// `id` is already the current channel.
    pub fn switch_channel(&mut self, id: ChannelId) -> bool {
        if id == self.channel() {
            return false;
        }

        tracing::info!(from = %self.channel(), to = %id, "Switching channel");
        self.canvas.clear();
        self.subscription.set_target(id);
        true
    }

    /// Switches to a freshly generated channel and returns it.
    pub fn new_channel(&mut self) -> ChannelId {
        let id = ChannelId::generate();
        self.switch_channel(id.clone());
        id
    }

    /// Follows a changed URL fragment.
    ///
    /// A fragment carrying an id switches to it. An empty or unreadable one
    /// keeps the current channel. Either way the returned id is what the
    /// fragment should now read.
    pub fn follow_fragment(&mut self, fragment: &str) -> ChannelId {
        match ChannelId::from_fragment(fragment) {
            Ok(id) => {
                self.switch_channel(id);
            }
            Err(e) => tracing::debug!("Keeping current channel: {}", e),
        }
        self.channel()
    }

    /// Feeds pointer input. Returns true if a stroke frame was queued.
    pub fn pointer(&mut self, event: PointerEvent) -> bool {
        self.canvas.handle_pointer(event)
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.canvas.set_viewport(viewport);
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.manager.set_visibility(visibility);
    }

    pub fn channel(&self) -> ChannelId {
        self.subscription.current()
    }

    /// Watches channel changes.
    pub fn channel_changes(&self) -> watch::Receiver<ChannelId> {
        self.subscription.changes()
    }

    /// The URL that brings someone else into this channel.
    pub fn share_url(&self) -> String {
        share_url(&self.server_url, &self.channel())
    }

    pub fn title(&self) -> String {
        format!("{}: {}", TITLE_PREFIX, self.channel())
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn canvas(&self) -> &DrawSyncController {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut DrawSyncController {
        &mut self.canvas
    }

    pub fn snapshot(&self) -> Surface {
        self.canvas.snapshot()
    }

    /// Stops the connection, dropping anything not yet sent.
    pub fn shutdown(&self) {
        self.manager.shutdown();
    }

    /// Stops the connection after writing out what is already queued.
    pub async fn close(&self) {
        self.manager.close().await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.manager.shutdown();
    }
}
