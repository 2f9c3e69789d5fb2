//! Send a single stroke to a channel.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use odai_core::canvas::{codec, CodecError};
use odai_core::{ChannelId, ConnectionState, Frame, Point, PointerEvent, Session};

use crate::config::Config;

/// Draw one stroke on a channel's canvas
#[derive(Debug, Args)]
pub struct DrawCommand {
    /// Channel to draw on
    #[arg(long)]
    channel: String,

    /// Stroke points in canvas pixels, e.g. "10,10 50,50 50,80"
    #[arg(long)]
    points: String,

    /// PNG to draw on top of (default: a blank canvas)
    #[arg(long)]
    base: Option<PathBuf>,

    /// Seconds to wait for the relay
    #[arg(long, default_value = "10")]
    timeout: u64,
}

impl DrawCommand {
    pub async fn run(&self, config: &Config) -> Result<(), DrawCommandError> {
        let channel = ChannelId::from_user_input(&self.channel);
        if channel.is_empty() {
            return Err(DrawCommandError::EmptyChannel);
        }
        let points = parse_points(&self.points)?;
        let timeout = Duration::from_secs(self.timeout);

        let mut session = Session::start(config.session(), channel);

        if let Some(base) = &self.base {
            let bytes = std::fs::read(base)
                .map_err(|e| DrawCommandError::ReadBase(base.clone(), e))?;
            let image = codec::decode(&Frame::from(bytes))?;
            session.canvas_mut().load(&image);
        }

        let mut state = session.manager().state_changes();
        let opened = tokio::time::timeout(timeout, state.wait_for(|s| *s == ConnectionState::Open))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);
        if !opened {
            session.shutdown();
            return Err(DrawCommandError::Timeout(session.manager().endpoint().to_string()));
        }

        for event in gesture(&points) {
            session.pointer(event);
        }

        let mut sent = session.canvas().frames_sent();
        let delivered = tokio::time::timeout(timeout, sent.wait_for(|n| *n >= 1))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);
        if !delivered {
            session.shutdown();
            return Err(DrawCommandError::Timeout(session.manager().endpoint().to_string()));
        }

        session.close().await;
        println!(
            "Sent stroke ({} point{}) to {}",
            points.len(),
            if points.len() == 1 { "" } else { "s" },
            session.channel()
        );
        Ok(())
    }
}

/// Parses whitespace-separated `x,y` pairs.
fn parse_points(input: &str) -> Result<Vec<Point>, DrawCommandError> {
    let points = input
        .split_whitespace()
        .map(|pair| -> Result<Point, DrawCommandError> {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| DrawCommandError::InvalidPoint(pair.to_string()))?;
            let x = x
                .trim()
                .parse::<f32>()
                .map_err(|_| DrawCommandError::InvalidPoint(pair.to_string()))?;
            let y = y
                .trim()
                .parse::<f32>()
                .map_err(|_| DrawCommandError::InvalidPoint(pair.to_string()))?;
            Ok(Point::new(x, y))
        })
        .collect::<Result<Vec<_>, DrawCommandError>>()?;

    if points.is_empty() {
        return Err(DrawCommandError::NoPoints);
    }
    Ok(points)
}

/// Turns a point list into down, moves, up.
fn gesture(points: &[Point]) -> Vec<PointerEvent> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Vec::new();
    };

    let mut events = vec![PointerEvent::Down(*first)];
    if points.len() > 2 {
        events.extend(points[1..points.len() - 1].iter().map(|p| PointerEvent::Move(*p)));
    }
    events.push(PointerEvent::Up(*last));
    events
}

#[derive(Debug)]
pub enum DrawCommandError {
    EmptyChannel,
    NoPoints,
    InvalidPoint(String),
    ReadBase(PathBuf, std::io::Error),
    Codec(CodecError),
    Timeout(String),
}

impl std::fmt::Display for DrawCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrawCommandError::EmptyChannel => write!(f, "Channel id must not be empty"),
            DrawCommandError::NoPoints => write!(f, "At least one point is required"),
            DrawCommandError::InvalidPoint(p) => {
                write!(f, "Invalid point '{}': expected x,y", p)
            }
            DrawCommandError::ReadBase(path, e) => {
                write!(f, "Failed to read base image '{}': {}", path.display(), e)
            }
            DrawCommandError::Codec(e) => write!(f, "{}", e),
            DrawCommandError::Timeout(endpoint) => {
                write!(f, "Timed out waiting for relay at {}", endpoint)
            }
        }
    }
}

impl std::error::Error for DrawCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DrawCommandError::ReadBase(_, e) => Some(e),
            DrawCommandError::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodecError> for DrawCommandError {
    fn from(e: CodecError) -> Self {
        DrawCommandError::Codec(e)
    }
}
