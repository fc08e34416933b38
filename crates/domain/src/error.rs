/// Shared error type used across all Chatterbox crates.
///
/// The pipeline distinguishes a few broad classes because they carry
/// different policies: `Cancelled` is expected during barge-in and stays
/// quiet, `Protocol` means a malformed vendor payload (log and skip the
/// delta), `Config` fails startup hard, and `Tool` never crosses the
/// tool-dispatch boundary as an `Err` — it becomes tool-message content.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("protocol {provider}: {message}")]
    Protocol { provider: String, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("audio: {0}")]
    Audio(String),

    #[error("config: {0}")]
    Config(String),

    #[error("tool: {0}")]
    Tool(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors that are expected during a barge-in abort and
    /// should be logged at debug level only.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
