/// Result alias that carries the custom [`StorybookError`] type.
pub type Result<T> = std::result::Result<T, StorybookError>;

/// Common error type for the core crate.
///
/// Only [`StorybookError::ConfigLoad`] and [`StorybookError::UnsupportedProtocol`]
/// are meant to reach the user. Everything else is recovered inside the
/// component that raised it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorybookError {
    /// The book manifest could not be retrieved or parsed.
    #[error("failed to load manifest from `{location}`: {reason}")]
    ConfigLoad { location: String, reason: String },
    /// The manifest location uses a scheme the loader cannot serve.
    #[error("manifest location `{location}` uses unsupported protocol `{scheme}`; serve the book over http(s) or pass a plain file path")]
    UnsupportedProtocol { location: String, scheme: String },
    /// A button's sequence position does not address a valid audio pool entry.
    #[error("invalid audio index for button pos {pos:?} (resolved {index:?}, pool holds {pool_len})")]
    InvalidIndex {
        pos: Option<usize>,
        index: Option<i64>,
        pool_len: usize,
    },
    /// Retrieval of a media URL failed or timed out.
    #[error("failed to cache `{url}`: {reason}")]
    CacheFetch { url: String, reason: String },
    /// The platform refused to start playback.
    #[error("failed to start playback of `{url}`: {reason}")]
    MediaPlayback { url: String, reason: String },
    /// The fallback tone could not be produced.
    #[error("tone synthesis failed: {0}")]
    ToneSynthesis(String),
    #[error("{0}")]
    Message(String),
    #[error("{0}")]
    Io(String),
    #[error("{0}")]
    Json(String),
}

impl StorybookError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn cache_fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::CacheFetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn media_playback(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::MediaPlayback {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

// io and serde_json errors are not `Clone`; keep their rendered message so
// cache failures can be fanned out to every waiter.
impl From<std::io::Error> for StorybookError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for StorybookError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value.to_string())
    }
}

impl From<&str> for StorybookError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for StorybookError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
