use rand::distributions::WeightedError;

/// Result alias that carries the custom [`ParticleFxError`] type.
pub type Result<T> = std::result::Result<T, ParticleFxError>;

/// Common error type for the core crate.
///
/// Data exhaustion and numeric degeneracy never surface here; they are
/// recovered where they occur by returning zero-valued features. What remains
/// is configuration that cannot run and the handful of collaborator failures
/// the application forwards.
#[derive(Debug, thiserror::Error)]
pub enum ParticleFxError {
    /// Free-form message, mostly used by the application crate when wrapping
    /// decoder failures.
    #[error("{0}")]
    Message(String),
    /// Configuration rejected before the frame loop starts.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("fft error: {0}")]
    Fft(#[from] realfft::FftError),
    #[error("invalid weight table: {0}")]
    Weights(#[from] WeightedError),
}

impl ParticleFxError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<&str> for ParticleFxError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ParticleFxError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
