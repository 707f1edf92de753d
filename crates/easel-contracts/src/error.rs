use crate::request::Capability;

/// Failure taxonomy shared by every operation.
///
/// `Validation` and `Config` are raised before any network call is made.
/// `Provider`, `Network` and `PollTimeout` come out of the HTTP layer once
/// its retry or poll budget is spent.
#[derive(Debug, thiserror::Error)]
pub enum EaselError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Config(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("{capability} is not supported by provider {provider}")]
    Unsupported {
        provider: String,
        capability: Capability,
    },

    #[error("API error: {message}")]
    Provider { status: Option<u16>, message: String },

    #[error("connection error: {0}")]
    Network(String),

    #[error("failed to decode provider response: {0}")]
    Decode(String),

    #[error("prediction did not finish after {attempts} status checks")]
    PollTimeout { attempts: u32 },

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

impl EaselError {
    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Provider {
                status: Some(status),
                ..
            } => RETRYABLE_STATUSES.contains(status),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EaselError>;
