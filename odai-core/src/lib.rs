//! Odai Core Library
//!
//! Connection management and canvas synchronization for Odai, a shared
//! drawing surface scoped by a channel id and relayed over one WebSocket.
//!
//! The pieces, leaf first:
//! - [`ChannelId`]: the opaque token naming a shared canvas
//! - [`ConnectionManager`]: the single self-healing relay connection
//! - [`canvas::codec`]: raster surface <-> PNG frame conversion
//! - [`SubscriptionController`]: tracks and (re)announces the current channel
//! - [`DrawSyncController`]: pointer gestures out, inbound frames in
//! - [`Session`]: the small interface a UI collaborator drives

pub mod canvas;
pub mod channel_id;
pub mod session;
pub mod subscription;
pub mod sync;

#[cfg(test)]
mod testing;

pub use canvas::{
    DrawSyncController, FrameSink, Point, PointerEvent, Stroke, StrokeState, Surface, Viewport,
};
pub use channel_id::{share_url, ChannelId, ChannelIdError};
pub use session::{Session, SessionConfig};
pub use subscription::SubscriptionController;
pub use sync::{
    endpoint_url, ConnectionManager, ConnectionState, Frame, HandlerId, HandlerRegistry,
    RetryPolicy, SyncError, Visibility,
};
