//! Channel id handling.
//!
//! A channel id is an opaque, case-sensitive token that scopes a shared
//! canvas. Anyone who knows the id joins the same canvas, so collisions are
//! how sharing works rather than something to guard against. Generated ids
//! are 12 random bytes in URL-safe base64, which keeps them usable as a URL
//! fragment without escaping.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sync::http_origin;

/// Number of random bytes in a generated channel id.
pub const RANDOM_BYTES: usize = 12;

/// Errors that can occur when reading a channel id from outside input
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChannelIdError {
    #[error("No channel id present")]
    Empty,

    #[error("Invalid percent-encoding in fragment: {0}")]
    InvalidEncoding(String),
}

/// An opaque channel id.
///
/// The empty id is valid and means "no channel": nothing is subscribed
/// while it is the current target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Generate a new random channel id
    pub fn generate() -> Self {
        let bytes: [u8; RANDOM_BYTES] = rand::random();
        Self(URL_SAFE.encode(bytes))
    }

    /// Adopt an id verbatim
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The "no channel" id
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Adopt an id typed by the user; surrounding whitespace is dropped
    pub fn from_user_input(input: &str) -> Self {
        Self(input.trim().to_string())
    }

    /// Read the id carried in a URL fragment.
    ///
    /// Accepts a full URL (`https://host/#abc`), a bare fragment (`#abc`)
    /// or the id itself. Percent-escapes are decoded. A URL without a
    /// fragment carries no id.
    pub fn from_fragment(input: &str) -> Result<Self, ChannelIdError> {
        let raw = match input.split_once('#') {
            Some((_, fragment)) => fragment,
            None if input.contains("://") || input.contains('/') => {
                return Err(ChannelIdError::Empty);
            }
            None => input,
        };

        let decoded = urlencoding::decode(raw)
            .map_err(|e| ChannelIdError::InvalidEncoding(e.to_string()))?;

        if decoded.is_empty() {
            return Err(ChannelIdError::Empty);
        }

        Ok(Self(decoded.into_owned()))
    }

    /// Pick the id for a new session: the URL fragment if it carries one,
    /// else the user's entry if non-blank, else a fresh random id.
    pub fn resolve(fragment: Option<&str>, user_input: Option<&str>) -> Self {
        if let Some(id) = fragment.and_then(|f| Self::from_fragment(f).ok()) {
            return id;
        }

        match user_input.map(Self::from_user_input) {
            Some(id) if !id.is_empty() => id,
            _ => Self::generate(),
        }
    }

    /// Whether this is the "no channel" id
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render as a URL fragment (`#<id>`)
    pub fn to_fragment(&self) -> String {
        format!("#{}", self.0)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Build the shareable URL for a channel on the given server.
pub fn share_url(server_url: &str, id: &ChannelId) -> String {
    format!("{}/{}", http_origin(server_url), id.to_fragment())
}
