use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    /// The relay socket could not be opened.
    #[error("Signaling connect error: {0}")]
    Connect(String),
    #[error("Malformed signaling payload: {0}")]
    MalformedPayload(String),
    #[error("Unknown signaling message type: {0}")]
    UnknownMessageType(String),
    #[error("Send error: {0}")]
    Send(String),
    #[error("Link is not connecting")]
    NotConnecting,
    #[error("Connection timed out after {attempts} attempts")]
    ConnectionTimeout { attempts: u32 },
    #[error("Control channel unavailable")]
    ChannelUnavailable,
    #[error("Peer session error: {0}")]
    Peer(String),
    #[error("Video track ended")]
    TrackEnded,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LinkError {
    /// Errors that abort the orchestrator's receive loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkError::Connect(_) | LinkError::MalformedPayload(_) | LinkError::UnknownMessageType(_)
        )
    }

    /// Errors a caller may recover from by retrying later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LinkError::NotConnecting | LinkError::ConnectionTimeout { .. } | LinkError::ChannelUnavailable
        )
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        LinkError::MalformedPayload(e.to_string())
    }
}

impl From<config::ConfigError> for LinkError {
    fn from(e: config::ConfigError) -> Self {
        LinkError::Config(e.to_string())
    }
}
