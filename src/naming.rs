//! Output file naming: per-platform identity names and collision avoidance.
//!
//! Only `<name>.mp4` is checked for collisions. A file with the same base name and a
//! different extension is not detected.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{error::JobError, model::JobMetadata, model::VideoInfo, validator::Platform};

/// Extension probed when looking for an existing file.
pub const CHECKED_EXTENSION: &str = "mp4";
/// Number of `_N` suffixes tried before giving up.
pub const MAX_SUFFIX: u32 = 99;

type NamingFn = fn(&str, &VideoInfo) -> Option<String>;

/// Platforms whose output is named after the uploader rather than the title.
const NAMING_STRATEGIES: &[(Platform, NamingFn)] = &[
    (Platform::X, uploader_id),
    (Platform::Facebook, uploader_name),
    (Platform::TikTok, tiktok_handle),
];

static TIKTOK_HANDLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://www\.tiktok\.com/@([^/]+)/").expect("static regex"));

fn uploader_id(_url: &str, info: &VideoInfo) -> Option<String> {
    info.uploader_id.clone()
}

fn uploader_name(_url: &str, info: &VideoInfo) -> Option<String> {
    info.uploader.clone()
}

fn tiktok_handle(url: &str, _info: &VideoInfo) -> Option<String> {
    TIKTOK_HANDLE.captures(url).map(|c| c[1].to_owned())
}

/// Identity-based base name for `url`, before collision checks.
pub fn candidate_name(url: &str, metadata: &JobMetadata) -> Option<String> {
    let (_, strategy) = NAMING_STRATEGIES.iter().find(|(p, _)| *p == metadata.platform)?;
    let name = strategy(url, &metadata.info)?.replace(['/', '\\'], "_");
    let trimmed = name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Decides the output base name for a job.
///
/// `Ok(None)` keeps the default title-based naming. When `<dest>/<name>.mp4` already
/// exists, `name_1` through `name_99` are tried in order; if all of them are taken the
/// job fails with [`JobError::CollisionExhausted`].
pub fn resolve_output_name(
    url: &str,
    metadata: &JobMetadata,
    destination: &Path,
    exists: impl Fn(&Path) -> bool,
) -> Result<Option<String>, JobError> {
    let Some(base) = candidate_name(url, metadata) else {
        return Ok(None);
    };
    let taken = |name: &str| exists(&destination.join(format!("{name}.{CHECKED_EXTENSION}")));

    if !taken(&base) {
        return Ok(Some(base));
    }
    for i in 1..=MAX_SUFFIX {
        let name = format!("{base}_{i}");
        if !taken(&name) {
            tracing::debug!(%base, %name, "output name collided, using suffix");
            return Ok(Some(name));
        }
    }
    Err(JobError::CollisionExhausted { base, attempts: MAX_SUFFIX })
}

/// yt-dlp treats `%` as a template marker.
fn escape_template(text: &str) -> String {
    text.replace('%', "%%")
}

/// yt-dlp `-o` template for a job: the resolved name if any, otherwise the video title.
pub fn output_template(destination: &Path, name: Option<&str>) -> String {
    let dir = escape_template(&destination.to_string_lossy());
    let file = match name {
        Some(name) => format!("{}.%(ext)s", escape_template(name)),
        None => "%(title)s.%(ext)s".to_owned(),
    };
    Path::new(&dir).join(file).to_string_lossy().into_owned()
}
