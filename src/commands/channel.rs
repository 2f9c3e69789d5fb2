//! Channel id commands.

use clap::{Args, Subcommand};
use odai_core::{share_url, ChannelId, ChannelIdError};

use crate::config::Config;

/// Create and inspect channel ids
#[derive(Debug, Args)]
pub struct ChannelCommand {
    #[command(subcommand)]
    command: ChannelSubcommand,
}

#[derive(Debug, Subcommand)]
enum ChannelSubcommand {
    /// Generate a new random channel id
    New,

    /// Print the channel id carried in a share URL
    Parse {
        /// Share URL or fragment, e.g. "https://odai.example.com/#abc123"
        url: String,
    },
}

impl ChannelCommand {
    pub fn run(&self, config: &Config) -> Result<(), ChannelCommandError> {
        match &self.command {
            ChannelSubcommand::New => {
                let id = ChannelId::generate();
                println!("{}", describe(&id, &config.server_url.value));
                Ok(())
            }
            ChannelSubcommand::Parse { url } => {
                let id = ChannelId::from_fragment(url)?;
                println!("{}", id);
                Ok(())
            }
        }
    }
}

fn describe(id: &ChannelId, server_url: &str) -> String {
    format!("Channel: {}\nShare:   {}", id, share_url(server_url, id))
}

#[derive(Debug)]
pub enum ChannelCommandError {
    InvalidChannel(ChannelIdError),
}

impl std::fmt::Display for ChannelCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelCommandError::InvalidChannel(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ChannelCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChannelCommandError::InvalidChannel(e) => Some(e),
        }
    }
}

impl From<ChannelIdError> for ChannelCommandError {
    fn from(e: ChannelIdError) -> Self {
        ChannelCommandError::InvalidChannel(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_includes_share_url() {
        let text = describe(&ChannelId::new("abc123"), "https://odai.example.com/");
        assert_eq!(
            text,
            "Channel: abc123\nShare:   https://odai.example.com/#abc123"
        );
    }

    #[test]
    fn test_parse_error_message() {
        let err = ChannelCommandError::from(ChannelIdError::Empty);
        assert_eq!(err.to_string(), "No channel id present");
    }
}
