use thiserror::Error;

/// Failures the editing core reports outward.
///
/// Precondition misses (nothing loaded, empty crop, no hit under the pointer)
/// are not represented here: those operations return `false` / `None` and
/// leave the session untouched.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("File is too large ({size} bytes, limit is {limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    #[error("Please enter a prompt")]
    EmptyPrompt,

    #[error("Malformed data URI: {0}")]
    MalformedDataUri(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Processing timed out after {attempts} attempts")]
    RemoteTimeout { attempts: u32 },

    #[error("Processing failed: {0}")]
    RemoteFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Invalid project file: {0}")]
    InvalidProject(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EditError>;

impl From<Box<bincode::ErrorKind>> for EditError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        EditError::Serialize(e.to_string())
    }
}

impl From<toml::de::Error> for EditError {
    fn from(e: toml::de::Error) -> Self {
        EditError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for EditError {
    fn from(e: toml::ser::Error) -> Self {
        EditError::Config(e.to_string())
    }
}

impl EditError {
    /// True for failures caught before any work was attempted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EditError::UnsupportedType(_)
                | EditError::TooLarge { .. }
                | EditError::EmptyPrompt
                | EditError::MalformedDataUri(_)
        )
    }

    /// True for failures reported by a remote-processing collaborator.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            EditError::RemoteTimeout { .. } | EditError::RemoteFailed(_) | EditError::Network(_)
        )
    }
}
