use thiserror::Error;

/// Failures of the external yt-dlp process.
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("failed to start yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("io error while talking to yt-dlp: {0}")]
    Io(#[from] std::io::Error),

    #[error("yt-dlp exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("yt-dlp returned invalid metadata: {0}")]
    InvalidMetadata(#[from] serde_json::Error),

    #[error("yt-dlp output pipe was not captured")]
    MissingPipe,
}

/// Everything that can stop a job, from submission to the terminal event.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("unsupported URL: {0}")]
    InvalidUrl(String),

    #[error("no download directory selected")]
    MissingDestination,

    #[error("a download is already running")]
    Busy,

    #[error("could not fetch video info: {0}")]
    MetadataFetch(#[source] ExtractorError),

    #[error("too many files named after {base} (tried {attempts} suffixes)")]
    CollisionExhausted { base: String, attempts: u32 },

    #[error("download failed: {0}")]
    Download(#[source] ExtractorError),
}

impl JobError {
    /// Rejected before any background work was started.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, JobError::InvalidUrl(_) | JobError::MissingDestination)
    }
}
