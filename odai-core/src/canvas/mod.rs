//! The drawing surface and its synchronization.
//!
//! - [`surface`]: an in-memory RGBA raster plus the on-screen viewport
//! - [`codec`]: surface <-> PNG frame conversion
//! - [`draw_sync`]: turns pointer gestures into outbound frames and inbound
//!   frames into repaints

pub mod codec;
pub mod draw_sync;
pub mod surface;

pub use codec::CodecError;
pub use draw_sync::{DrawSyncController, FrameSink, PointerEvent, StrokeState};
pub use surface::{Point, Stroke, Surface, Viewport};
