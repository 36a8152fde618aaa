use chatr_network::PacketEncodeError;
use chatr_network::chat::ShapeError;
use thiserror::Error;

/// Why a packet was passed through instead of being rendered.
#[derive(Debug, Error)]
pub enum InterceptError {
    #[error("no chat schema for protocol {0}")]
    UnknownProtocol(i32),
    #[error("unrecognized shape for chat packet {packet_id:#04x}: {source}")]
    UnrecognizedPacketShape {
        packet_id: i32,
        #[source]
        source: ShapeError,
    },
}

/// A transformer failed. The pipeline skips its effect and carries on.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{0}")]
    Failed(String),
    #[error("transformer panicked")]
    Panicked,
}

impl TransformError {
    pub fn failed(message: impl Into<String>) -> Self {
        TransformError::Failed(message.into())
    }
}

/// The rendered text could not be put back into the packet. The original
/// packet is sent instead.
#[derive(Debug, Error)]
pub enum RewriteFailure {
    #[error("text field {start}..{end} is outside of the {len} byte packet")]
    MissingTextField { start: usize, end: usize, len: usize },
    #[error("rendered text is {len} characters long, the limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("rendered text could not be encoded: {0}")]
    Encode(#[source] PacketEncodeError),
}

impl From<PacketEncodeError> for RewriteFailure {
    fn from(err: PacketEncodeError) -> Self {
        match err {
            PacketEncodeError::StringTooLong { len, max } => RewriteFailure::TooLong { len, max },
            err => RewriteFailure::Encode(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("config is not valid toml: {0}")]
    Parse(#[from] toml_edit::TomlError),
    #[error("config has the wrong shape: {0}")]
    Deserialize(#[from] toml::de::Error),
    #[error("invalid filter wordlist: {0}")]
    Wordlist(#[from] regex::Error),
    #[error("invalid value for `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start render threads: {0}")]
    Runtime(#[from] std::io::Error),
}
