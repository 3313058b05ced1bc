/// Result alias that carries the custom [`TimelineError`] type.
pub type Result<T> = std::result::Result<T, TimelineError>;

/// Common error type for the core crate.
///
/// Variants fall into two classes: conditions the caller fixes by changing its
/// input, and conditions that may clear up on retry. See
/// [`TimelineError::is_retryable`].
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    /// A command received a value outside its accepted range. Prior state is
    /// retained.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The monotonic clock (or another startup resource) could not be acquired.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),
    /// `play` was issued before the clock finished initialising.
    #[error("playback clock is not ready; initialise it before playing")]
    NotReady,
    #[error("unknown track `{0}`")]
    UnknownTrack(String),
    #[error("track `{0}` already exists")]
    DuplicateTrack(String),
    #[error("unknown asset `{0}` referenced by keyframe")]
    MissingAsset(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration files that fail to parse.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl TimelineError {
    /// Creates an [`TimelineError::InvalidParameter`] from any message.
    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Returns `true` when retrying later may succeed, `false` when the caller
    /// has to change its input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceUnavailable(_) | Self::NotReady)
    }
}
