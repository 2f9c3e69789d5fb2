//! Relay connection and message plumbing.
//!
//! One WebSocket carries two kinds of traffic:
//! - JSON text control messages, client to relay (`set_canvas`)
//! - binary frames in both directions, each a complete PNG snapshot
//!
//! The [`ConnectionManager`] owns that socket, retries it forever while the
//! page is visible, and fans inbound frames out through a
//! [`HandlerRegistry`].

mod connection;
mod error;
mod frame;
mod handlers;
mod protocol;
mod scheduler;

pub use connection::{
    transition, ConnectionManager, ConnectionState, Effect, LinkEvent, RetryPolicy, Visibility,
};
pub use error::SyncError;
pub use frame::Frame;
pub use handlers::{FrameHandler, HandlerId, HandlerRegistry};
pub use protocol::ControlMessage;
pub use scheduler::ScheduledTask;

/// Path of the relay endpoint on the server origin.
pub const ENDPOINT_PATH: &str = "/ws";

/// Builds the WebSocket URL of the relay endpoint for a server URL.
///
/// `http(s)://` becomes `ws(s)://`; a bare `host:port` is treated as `ws://`.
pub fn endpoint_url(server_url: &str) -> String {
    let base_url = if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if !server_url.starts_with("ws://") && !server_url.starts_with("wss://") {
        format!("ws://{}", server_url)
    } else {
        server_url.to_string()
    };

    format!("{}{}", base_url.trim_end_matches('/'), ENDPOINT_PATH)
}

/// Builds the HTTP origin (no trailing slash) for a server URL.
pub fn http_origin(server_url: &str) -> String {
    let base_url = if let Some(rest) = server_url.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else if let Some(rest) = server_url.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
        format!("http://{}", server_url)
    } else {
        server_url.to_string()
    };

    base_url.trim_end_matches('/').to_string()
}
