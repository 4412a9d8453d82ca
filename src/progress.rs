/// Marker prepended to every line printed through our `--progress-template`.
pub const PROGRESS_PREFIX: &str = "clipgrab-progress:";

/// Template passed to yt-dlp. Missing fields are printed as `NA`.
pub fn progress_template() -> String {
    format!(
        "download:{PROGRESS_PREFIX}%(progress.status)s \
         %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s \
         %(progress.fragment_index)s %(progress.fragment_count)s"
    )
}

/// yt-dlp's `progress.status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    Downloading,
    Finished,
    Error,
    Other,
}

/// One progress callback from yt-dlp, counters only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawProgress {
    pub status: HookStatus,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
    pub fragment_index: Option<u64>,
    pub fragment_count: Option<u64>,
}

impl RawProgress {
    pub fn downloading(downloaded: u64, total: u64) -> Self {
        Self {
            status: HookStatus::Downloading,
            downloaded_bytes: Some(downloaded),
            total_bytes: Some(total),
            total_bytes_estimate: None,
            fragment_index: None,
            fragment_count: None,
        }
    }

    /// Completion derived from byte counters, then fragment counters.
    /// The percentage string yt-dlp precomputes jumps around and is never consulted.
    pub fn fraction(&self) -> Option<f32> {
        let ratio = |done: u64, total: u64| (total > 0).then(|| (done as f64 / total as f64) as f32);

        let by_bytes = self.downloaded_bytes.and_then(|done| {
            self.total_bytes
                .filter(|t| *t > 0)
                .or(self.total_bytes_estimate)
                .and_then(|total| ratio(done, total))
        });
        let by_fragments = || match (self.fragment_index, self.fragment_count) {
            (Some(index), Some(count)) => ratio(index, count),
            _ => None,
        };
        by_bytes.or_else(by_fragments).map(|f| f.clamp(0.0, 1.0))
    }
}

/// yt-dlp prints integers, but estimates sometimes come out as floats.
fn parse_counter(field: &str) -> Option<u64> {
    field
        .parse::<u64>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
}

/// Parses one stdout line produced by [`progress_template`].
pub fn parse_progress_from_line(line: &str) -> Option<RawProgress> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split_whitespace();
    let status = match fields.next()? {
        "downloading" => HookStatus::Downloading,
        "finished" => HookStatus::Finished,
        "error" => HookStatus::Error,
        _ => HookStatus::Other,
    };
    let mut next = || fields.next().and_then(parse_counter);
    Some(RawProgress {
        status,
        downloaded_bytes: next(),
        total_bytes: next(),
        total_bytes_estimate: next(),
        fragment_index: next(),
        fragment_count: next(),
    })
}

/// Keeps the fraction reported for one job from ever going backwards.
///
/// yt-dlp downloads video and audio streams one after another, restarting its byte
/// counters for each, so the highest value seen so far is what gets reported.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    best: Option<f32>,
}

impl ProgressTracker {
    /// Returns `None` for callbacks that are not download progress.
    /// `Some(None)` means downloading with nothing known about the total yet.
    pub fn observe(&mut self, raw: &RawProgress) -> Option<Option<f32>> {
        if raw.status != HookStatus::Downloading {
            return None;
        }
        if let Some(fraction) = raw.fraction() {
            self.best = Some(self.best.map_or(fraction, |best| best.max(fraction)));
        }
        Some(self.best)
    }
}
