use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::Command,
};

use crate::{
    error::ExtractorError,
    model::VideoInfo,
    progress::{RawProgress, parse_progress_from_line, progress_template},
    validator::Platform,
};

#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

/// Per-job settings handed to the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// yt-dlp `-o` template, e.g. `dir/%(title)s.%(ext)s`
    pub output_template: String,
    /// Browser to borrow cookies from, if any
    pub cookies_from_browser: Option<String>,
}

/// Which browser cookies are passed to yt-dlp, and for which platforms they are not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookiePolicy {
    pub browser: Option<String>,
    pub disabled_for: Vec<Platform>,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            browser: Some("firefox".to_owned()),
            // With browser cookies yt-dlp fails to fetch 4K YouTube formats.
            disabled_for: vec![Platform::YouTube],
        }
    }
}

impl CookiePolicy {
    pub fn browser_for(&self, platform: Platform) -> Option<String> {
        if self.disabled_for.contains(&platform) {
            None
        } else {
            self.browser.clone()
        }
    }
}

/// The external extraction/download library.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetches metadata only; nothing is written to disk.
    async fn extract_metadata(
        &self,
        url: &str,
        options: &DownloadOptions,
    ) -> Result<VideoInfo, ExtractorError>;

    /// Downloads `url`, calling `on_progress` for every progress report.
    async fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        on_progress: &mut (dyn FnMut(RawProgress) + Send),
    ) -> Result<(), ExtractorError>;
}

/// Drives the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// Uses the yt-dlp binary embedded under `assets/` when present, otherwise `yt-dlp` from PATH.
    /// Touches the disk; call it before the window opens.
    pub fn locate() -> Self {
        let bin = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };
        let Some(data) = Asset::get(bin) else {
            tracing::info!("no embedded yt-dlp, using the one on PATH");
            return Self::new(bin);
        };
        let tmp = std::env::temp_dir().join(bin);
        match extract_binary(&tmp, &data.data) {
            Ok(()) => Self::new(tmp),
            Err(e) => {
                tracing::warn!(error = %e, path = %tmp.display(), "embedded yt-dlp not extracted, using PATH");
                Self::new(bin)
            }
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, options: &DownloadOptions) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--no-warnings").arg("--no-playlist").arg("--encoding").arg("utf-8");
        if let Some(browser) = &options.cookies_from_browser {
            cmd.arg("--cookies-from-browser").arg(browser);
        }
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }
}

/// Writes `data` to `path` unless an identical copy is already there.
///
/// The bytes land in a `.part` sibling first and are renamed into place, so an
/// interrupted write never leaves a truncated binary under the final name.
fn extract_binary(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let up_to_date = std::fs::metadata(path).is_ok_and(|m| m.len() == data.len() as u64)
        && std::fs::read(path).is_ok_and(|existing| existing == data);
    if up_to_date {
        return Ok(());
    }
    let partial = path.with_extension("part");
    let mut f = File::create(&partial)?;
    f.write_all(data)?;
    f.sync_all()?;
    drop(f);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&partial, std::fs::Permissions::from_mode(0o755))?;
    }
    std::fs::rename(&partial, path)?;
    tracing::debug!(path = %path.display(), "extracted embedded yt-dlp");
    Ok(())
}

fn failure(code: Option<i32>, stderr: &[u8]) -> ExtractorError {
    ExtractorError::Failed { code, stderr: String::from_utf8_lossy(stderr).trim().to_owned() }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn extract_metadata(
        &self,
        url: &str,
        options: &DownloadOptions,
    ) -> Result<VideoInfo, ExtractorError> {
        let mut cmd = self.command(options);
        cmd.arg("--dump-single-json").arg("--").arg(url);
        tracing::debug!(?cmd, "fetching metadata");

        let output = cmd.output().await.map_err(ExtractorError::Spawn)?;
        if !output.status.success() {
            return Err(failure(output.status.code(), &output.stderr));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        on_progress: &mut (dyn FnMut(RawProgress) + Send),
    ) -> Result<(), ExtractorError> {
        let mut cmd = self.command(options);
        cmd.arg("--newline")
            .arg("--progress-template")
            .arg(progress_template())
            .arg("-o")
            .arg(&options.output_template)
            .arg("--")
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        tracing::debug!(?cmd, "starting download");

        let mut child = cmd.spawn().map_err(ExtractorError::Spawn)?;
        let out = child.stdout.take().ok_or(ExtractorError::MissingPipe)?;
        let mut err = child.stderr.take().ok_or(ExtractorError::MissingPipe)?;

        // Drained on its own task so a chatty stderr cannot stall stdout.
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = err.read_to_end(&mut buf).await;
            buf
        });

        // Console code pages can still leak non-UTF-8 bytes (e.g. a cp932 file name).
        let mut lines = BufReader::new(out).split(b'\n');
        while let Some(bytes) = lines.next_segment().await? {
            let line = String::from_utf8_lossy(&bytes);
            match parse_progress_from_line(&line) {
                Some(raw) => on_progress(raw),
                None => tracing::trace!(%line, "yt-dlp"),
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(failure(status.code(), &stderr));
        }
        Ok(())
    }
}
