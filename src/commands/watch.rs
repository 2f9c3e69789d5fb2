//! Follow a channel and save what is drawn on it.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use clap::Args;
use odai_core::canvas::{codec, CodecError};
use odai_core::{ChannelId, Session, Surface};

use crate::config::Config;

/// Join a channel and save every received canvas as a PNG
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Channel to join (default: a new random channel)
    #[arg(long)]
    channel: Option<String>,

    /// Directory to save canvases to (default: output_dir from config)
    #[arg(long)]
    out: Option<PathBuf>,
}

impl WatchCommand {
    pub async fn run(&self, config: &Config) -> Result<(), WatchCommandError> {
        let out_dir = self
            .out
            .clone()
            .unwrap_or_else(|| config.output_dir.value.clone());
        std::fs::create_dir_all(&out_dir)?;

        let channel = ChannelId::resolve(None, self.channel.as_deref());
        let session = Session::start(config.session(), channel);

        println!("Watching {}", session.title());
        println!("Share:  {}", session.share_url());
        println!("Saving to {}", out_dir.display());
        println!("Press Ctrl-C to stop.");

        let mut repaints = session.canvas().repaints();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut saved = 0usize;
        loop {
            tokio::select! {
                changed = repaints.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let path = save_snapshot(&out_dir, &session.snapshot(), Local::now())?;
                    saved += 1;
                    println!("Saved {}", path.display());
                }
                _ = &mut ctrl_c => break,
            }
        }

        session.shutdown();
        println!();
        println!(
            "Saved {} canvas{}.",
            saved,
            if saved == 1 { "" } else { "es" }
        );
        Ok(())
    }
}

/// Writes `surface` as a timestamped PNG in `dir` and returns its path.
///
/// Never overwrites: a name already taken gets a `-1`, `-2`, ... suffix.
fn save_snapshot(
    dir: &Path,
    surface: &Surface,
    at: DateTime<Local>,
) -> Result<PathBuf, WatchCommandError> {
    let frame = codec::encode(surface)?;
    let stem = format!("odai-{}", at.format("%Y%m%d-%H%M%S-%3f"));

    let mut suffix = 0u32;
    let (path, mut file) = loop {
        let name = match suffix {
            0 => format!("{}.png", stem),
            n => format!("{}-{}.png", stem, n),
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => break (path, file),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(e.into()),
        }
    };

    file.write_all(frame.as_bytes())?;
    tracing::debug!(path = %path.display(), bytes = frame.len(), "Canvas saved");
    Ok(path)
}

#[derive(Debug)]
pub enum WatchCommandError {
    Io(std::io::Error),
    Codec(CodecError),
}

impl std::fmt::Display for WatchCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchCommandError::Io(e) => write!(f, "Failed to save canvas: {}", e),
            WatchCommandError::Codec(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for WatchCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatchCommandError::Io(e) => Some(e),
            WatchCommandError::Codec(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for WatchCommandError {
    fn from(e: std::io::Error) -> Self {
        WatchCommandError::Io(e)
    }
}

impl From<CodecError> for WatchCommandError {
    fn from(e: CodecError) -> Self {
        WatchCommandError::Codec(e)
    }
}
