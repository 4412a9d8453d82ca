use std::path::PathBuf;

use serde::Deserialize;

use crate::validator::Platform;

/// A single user-triggered download. Never mutated once the job is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Source URL exactly as entered
    pub url: String,
    /// Folder the output file is written to
    pub destination: PathBuf,
}

/// Subset of yt-dlp's `--dump-single-json` output the job cares about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub uploader_id: Option<String>,
    #[serde(default)]
    pub extractor_key: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// What the metadata phase hands to naming resolution.
#[derive(Debug, Clone)]
pub struct JobMetadata {
    pub info: VideoInfo,
    pub platform: Platform,
}

/// Phase a job is in, as seen by the presenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetching,
    Downloading,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }
}

/// One update sent from the worker to the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub phase: Phase,
    /// 0.0 to 1.0, `None` when the total size is unknown
    pub fraction: Option<f32>,
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn fetched(title: String) -> Self {
        Self { phase: Phase::Fetching, fraction: None, message: Some(title) }
    }

    pub fn downloading(fraction: Option<f32>) -> Self {
        Self { phase: Phase::Downloading, fraction, message: None }
    }

    pub fn completed() -> Self {
        Self { phase: Phase::Completed, fraction: Some(1.0), message: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { phase: Phase::Failed, fraction: None, message: Some(message.into()) }
    }
}
