//! Error taxonomy shared by every extraction path.

use thiserror::Error;

/// Coarse classification used by the CLI to pick an exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    MissingChannel,
    Configuration,
    Container,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Format => "format",
            ErrorKind::MissingChannel => "missing-channel",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Container => "container",
            ErrorKind::Io => "io",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorKind::Format => 2,
            ErrorKind::MissingChannel => 3,
            ErrorKind::Configuration => 4,
            ErrorKind::Container => 5,
            ErrorKind::Io => 6,
        }
    }
}

#[derive(Debug, Error)]
pub enum Svo2Error {
    #[error("{record}: expected exactly {expected} bytes, got {actual}")]
    RecordLength {
        record: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("no message found on required channel '{0}'")]
    MissingChannel(String),

    #[error("channel '{0}' not found")]
    ChannelNotFound(String),

    #[error("{0}")]
    Configuration(String),

    #[error("mcap: {0}")]
    Mcap(#[from] mcap::McapError),

    #[error("muxer: {0}")]
    Mux(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Svo2Error {
    pub fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Svo2Error::Malformed {
            what,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Svo2Error::RecordLength { .. } | Svo2Error::Malformed { .. } => ErrorKind::Format,
            Svo2Error::MissingChannel(_) | Svo2Error::ChannelNotFound(_) => {
                ErrorKind::MissingChannel
            }
            Svo2Error::Configuration(_) => ErrorKind::Configuration,
            Svo2Error::Mcap(_) | Svo2Error::Mux(_) => ErrorKind::Container,
            Svo2Error::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<serde_json::Error> for Svo2Error {
    fn from(e: serde_json::Error) -> Self {
        Svo2Error::malformed("json control record", e.to_string())
    }
}

impl From<base64::DecodeError> for Svo2Error {
    fn from(e: base64::DecodeError) -> Self {
        Svo2Error::malformed("base64 blob", e.to_string())
    }
}

pub type Result<T, E = Svo2Error> = std::result::Result<T, E>;
