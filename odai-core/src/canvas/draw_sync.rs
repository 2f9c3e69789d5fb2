//! Pointer gestures out, inbound frames in.
//!
//! Each gesture is a small state machine:
//!
//! ```text
//! Idle --down--> Drawing --move--> Drawing --up/leave--> Idle
//! ```
//!
//! Every move, up or leave while drawing rasterizes one segment locally.
//! Only the return to `Idle` produces a frame, so a whole stroke costs one
//! network send however many segments it has.
//!
//! Encoding and decoding run on background tasks, one frame at a time, so
//! frames leave in stroke-completion order and repaints happen in arrival
//! order. An inbound frame replaces the whole surface, including any stroke
//! still in progress.
//!
//! Clearing starts a new epoch. Snapshots queued before it are never sent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::RgbaImage;
use tokio::sync::{mpsc, watch};

use super::codec;
use super::surface::{Point, Stroke, Surface, Viewport};
use crate::sync::{ConnectionManager, Frame, HandlerId, HandlerRegistry};

/// Destination for outbound stroke frames.
pub trait FrameSink: Send + Sync + 'static {
    /// Sends a frame. Returns false if it was dropped.
    fn send_frame(&self, frame: Frame) -> bool;
}

impl FrameSink for ConnectionManager {
    fn send_frame(&self, frame: Frame) -> bool {
        self.send(frame)
    }
}

/// Pointer input in on-screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Point),
    Move(Point),
    Up(Point),
    /// The pointer left the drawing surface
    Leave(Point),
}

/// Where the current gesture is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrokeState {
    Idle,
    /// Drawing, with the last point reached in backing coordinates
    Drawing { last: Point },
}

/// A surface copy waiting to be encoded, tagged with the epoch it was
/// taken in.
struct Queued {
    epoch: u64,
    surface: Surface,
}

pub struct DrawSyncController {
    surface: Arc<Mutex<Surface>>,
    viewport: Viewport,
    stroke: Stroke,
    state: StrokeState,
    snapshots: mpsc::UnboundedSender<Queued>,
    epoch: Arc<Mutex<u64>>,
    handlers: HandlerRegistry,
    handler: HandlerId,
    repaints: watch::Receiver<u64>,
    sent: watch::Receiver<u64>,
    frames_queued: u64,
}

impl DrawSyncController {
    /// Starts the encoder and repaint tasks and registers for inbound frames.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<S: FrameSink>(
        sink: S,
        handlers: &HandlerRegistry,
        surface: Surface,
        viewport: Viewport,
    ) -> Self {
        let surface = Arc::new(Mutex::new(surface));
        let epoch = Arc::new(Mutex::new(0));

        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent) = watch::channel(0);
        tokio::spawn(run_encoder(sink, snapshot_rx, Arc::clone(&epoch), sent_tx));

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let handler = handlers.add(move |frame: &Frame| {
            let _ = frame_tx.send(frame.clone());
        });

        let (repaint_tx, repaints) = watch::channel(0);
        tokio::spawn(run_painter(Arc::clone(&surface), frame_rx, repaint_tx));

        Self {
            surface,
            viewport,
            stroke: Stroke::default(),
            state: StrokeState::Idle,
            snapshots: snapshot_tx,
            epoch,
            handlers: handlers.clone(),
            handler,
            repaints,
            sent,
            frames_queued: 0,
        }
    }

    /// Wires the controller to a connection manager, both ways.
    pub fn attach(manager: &ConnectionManager, surface: Surface, viewport: Viewport) -> Self {
        Self::new(manager.clone(), manager.handlers(), surface, viewport)
    }

    /// Feeds one pointer event. Returns true if it completed a stroke and
    /// queued a frame.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> bool {
        match (self.state, event) {
            (_, PointerEvent::Down(at)) => {
                let last = self.to_backing(at);
                self.state = StrokeState::Drawing { last };
                false
            }
            (StrokeState::Drawing { last }, PointerEvent::Move(to)) => {
                let last = self.draw_to(last, to);
                self.state = StrokeState::Drawing { last };
                false
            }
            (StrokeState::Drawing { last }, PointerEvent::Up(to) | PointerEvent::Leave(to)) => {
                self.draw_to(last, to);
                self.state = StrokeState::Idle;
                self.queue_frame();
                true
            }
            (StrokeState::Idle, _) => false,
        }
    }

    pub fn state(&self) -> StrokeState {
        self.state
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Updates the on-screen size after the canvas was resized.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn set_stroke(&mut self, stroke: Stroke) {
        self.stroke = stroke;
    }

    /// Wipes the surface. Nothing is sent, and stroke frames still waiting
    /// for the encoder are dropped.
    pub fn clear(&mut self) {
        *lock_epoch(&self.epoch) += 1;
        self.lock_surface().clear();
    }

    /// Replaces the surface with `image`, stretched to fit. Nothing is sent
    /// until the next stroke completes.
    pub fn load(&mut self, image: &RgbaImage) {
        self.lock_surface().replace_with(image);
    }

    /// Copy of the current surface.
    pub fn snapshot(&self) -> Surface {
        self.lock_surface().clone()
    }

    /// Counter bumped after every repaint from an inbound frame.
    pub fn repaints(&self) -> watch::Receiver<u64> {
        self.repaints.clone()
    }

    /// Counter bumped after every stroke frame the sink accepted.
    pub fn frames_sent(&self) -> watch::Receiver<u64> {
        self.sent.clone()
    }

    /// Number of stroke frames handed to the encoder so far.
    pub fn frames_queued(&self) -> u64 {
        self.frames_queued
    }

    fn lock_surface(&self) -> MutexGuard<'_, Surface> {
        self.surface.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn to_backing(&self, at: Point) -> Point {
        let surface = self.lock_surface();
        self.viewport.to_backing(at, &surface)
    }

    fn draw_to(&self, last: Point, screen: Point) -> Point {
        let mut surface = self.lock_surface();
        let to = self.viewport.to_backing(screen, &surface);
        surface.draw_segment(last, to, &self.stroke);
        to
    }

    fn queue_frame(&mut self) {
        let queued = Queued {
            epoch: *lock_epoch(&self.epoch),
            surface: self.snapshot(),
        };
        if self.snapshots.send(queued).is_ok() {
            self.frames_queued += 1;
        }
    }
}

impl Drop for DrawSyncController {
    fn drop(&mut self) {
        // The repaint task ends once its handler is gone; the encoder drains
        // what was queued and ends when `snapshots` is dropped.
        self.handlers.remove(self.handler);
    }
}

impl std::fmt::Debug for DrawSyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawSyncController")
            .field("state", &self.state)
            .field("viewport", &self.viewport)
            .field("frames_queued", &self.frames_queued)
            .finish_non_exhaustive()
    }
}

fn lock_epoch(epoch: &Mutex<u64>) -> MutexGuard<'_, u64> {
    epoch.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_encoder<S: FrameSink>(
    sink: S,
    mut snapshots: mpsc::UnboundedReceiver<Queued>,
    epoch: Arc<Mutex<u64>>,
    sent: watch::Sender<u64>,
) {
    while let Some(Queued { epoch: taken, surface }) = snapshots.recv().await {
        let stale = *lock_epoch(&epoch) != taken;
        if stale {
            tracing::debug!("Dropping stroke frame from before a clear");
            continue;
        }

        let encoded = tokio::task::spawn_blocking(move || codec::encode(&surface)).await;
        match encoded {
            Ok(Ok(frame)) => {
                // Held across the send so a clear cannot slip in between the
                // check and the frame reaching the sink.
                let current = lock_epoch(&epoch);
                if *current != taken {
                    tracing::debug!("Dropping stroke frame from before a clear");
                    continue;
                }
                if sink.send_frame(frame) {
                    sent.send_modify(|count| *count += 1);
                } else {
                    tracing::debug!("Stroke frame not sent");
                }
                drop(current);
            }
            Ok(Err(e)) => tracing::warn!("Failed to encode stroke: {}", e),
            Err(e) => tracing::warn!("Encoder task failed: {}", e),
        }
    }
}

async fn run_painter(
    surface: Arc<Mutex<Surface>>,
    mut frames: mpsc::UnboundedReceiver<Frame>,
    repaints: watch::Sender<u64>,
) {
    while let Some(frame) = frames.recv().await {
        let decoded = tokio::task::spawn_blocking(move || codec::decode(&frame)).await;
        let image = match decoded {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => {
                tracing::debug!("Skipping frame: {}", e);
                continue;
            }
            Err(e) => {
                tracing::warn!("Decoder task failed: {}", e);
                continue;
            }
        };

        surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace_with(&image);
        repaints.send_modify(|count| *count += 1);
    }
}
