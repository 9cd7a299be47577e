use std::fmt;

use crate::platform::ChannelError;
use crate::util::validators::OriginError;

pub type AuthorizeResult<T> = Result<T, AuthorizeError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeError {
    /// The abort signal fired before the operation settled.
    Cancelled,
    Channel(String),
    InvalidMessage(String),
    Transient { attempts: u32, message: String },
    Logic(String),
    InvalidOrigin(OriginError),
}

impl AuthorizeError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AuthorizeError::Cancelled => "authorize/cancelled",
            AuthorizeError::Channel(_) => "authorize/channel",
            AuthorizeError::InvalidMessage(_) => "authorize/invalid-message",
            AuthorizeError::Transient { .. } => "authorize/transient",
            AuthorizeError::Logic(_) => "authorize/logic",
            AuthorizeError::InvalidOrigin(_) => "authorize/invalid-origin",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AuthorizeError::Cancelled)
    }
}

impl fmt::Display for AuthorizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizeError::Cancelled => f.write_str("Abort signal received"),
            AuthorizeError::Channel(message) => write!(f, "Channel error: {message}"),
            AuthorizeError::InvalidMessage(message) => write!(f, "Invalid message: {message}"),
            AuthorizeError::Transient { attempts, message } => {
                write!(f, "Failed after {attempts} attempts: {message}")
            }
            AuthorizeError::Logic(message) => f.write_str(message),
            AuthorizeError::InvalidOrigin(error) => write!(f, "Invalid origin: {error}"),
        }
    }
}

impl std::error::Error for AuthorizeError {}

impl From<ChannelError> for AuthorizeError {
    fn from(error: ChannelError) -> Self {
        AuthorizeError::Channel(error.message().to_owned())
    }
}

impl From<OriginError> for AuthorizeError {
    fn from(error: OriginError) -> Self {
        AuthorizeError::InvalidOrigin(error)
    }
}
