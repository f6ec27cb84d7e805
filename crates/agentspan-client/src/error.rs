use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Agent process error: {0}")]
    Process(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invocation cancelled: {0}")]
    Cancelled(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    /// Stable class name for this error, recorded as the `error.type`
    /// attribute on spans and metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            AgentError::Connection(_) => "ConnectionError",
            AgentError::Process(_) => "ProcessError",
            AgentError::Transport(_) => "TransportError",
            AgentError::Cancelled(_) => "CancelledError",
            AgentError::Serialization(_) => "SerializationError",
            AgentError::Io(_) => "IoError",
            AgentError::Other(_) => "AgentError",
        }
    }

    /// Helper for creating general errors with a message
    pub fn message(msg: impl Into<String>) -> Self {
        AgentError::Other(anyhow::anyhow!("{}", msg.into()))
    }

    /// Helper for creating transport errors
    pub fn transport_error(msg: impl Into<String>) -> Self {
        AgentError::Transport(msg.into())
    }
}
