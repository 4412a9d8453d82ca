//! Download jobs: metadata fetch, naming resolution, download, and the one-slot
//! controller the UI thread talks to.
//!
//! The worker never touches presentation state. It sends [`ProgressEvent`]s over a
//! channel and the UI thread applies them in [`JobController::poll`].

use std::{path::PathBuf, sync::Arc};

use tokio::{
    runtime::Handle,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel},
};

use crate::{
    downloader::{CookiePolicy, DownloadOptions, Extractor},
    error::JobError,
    model::{JobMetadata, JobRequest, ProgressEvent},
    naming::{output_template, resolve_output_name},
    progress::{ProgressTracker, RawProgress},
    validator::classify,
};

/// Characters of the title shown as soon as metadata arrives.
pub const TITLE_PREVIEW_CHARS: usize = 35;

pub fn title_preview(title: &str) -> String {
    let mut preview: String = title.chars().take(TITLE_PREVIEW_CHARS).collect();
    preview.push_str("...");
    preview
}

/// Checks a submission before any background work is started.
pub fn validate(url: &str, destination: Option<&str>) -> Result<JobRequest, JobError> {
    if classify(url).is_none() {
        return Err(JobError::InvalidUrl(url.to_owned()));
    }
    let destination = destination
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or(JobError::MissingDestination)?;
    Ok(JobRequest { url: url.to_owned(), destination: PathBuf::from(destination) })
}

/// Runs one job to its terminal event. Every outcome ends in exactly one
/// `Completed` or `Failed` event.
pub async fn run_job(
    extractor: &dyn Extractor,
    request: &JobRequest,
    cookies: &CookiePolicy,
    events: &UnboundedSender<ProgressEvent>,
) -> Result<(), JobError> {
    let result = drive(extractor, request, cookies, events).await;
    let terminal = match &result {
        Ok(()) => ProgressEvent::completed(),
        Err(e) => ProgressEvent::failed(e.to_string()),
    };
    let _ = events.send(terminal);
    result
}

async fn drive(
    extractor: &dyn Extractor,
    request: &JobRequest,
    cookies: &CookiePolicy,
    events: &UnboundedSender<ProgressEvent>,
) -> Result<(), JobError> {
    let platform = classify(&request.url).ok_or_else(|| JobError::InvalidUrl(request.url.clone()))?;
    let mut options = DownloadOptions {
        output_template: output_template(&request.destination, None),
        cookies_from_browser: cookies.browser_for(platform),
    };

    let info = extractor
        .extract_metadata(&request.url, &options)
        .await
        .map_err(JobError::MetadataFetch)?;
    tracing::info!(
        title = %info.title,
        ?platform,
        extractor = ?info.extractor_key,
        duration = ?info.duration,
        "metadata fetched"
    );
    let _ = events.send(ProgressEvent::fetched(title_preview(&info.title)));

    let metadata = JobMetadata { info, platform };
    let name = resolve_output_name(&request.url, &metadata, &request.destination, |p| p.exists())?;
    if let Some(name) = &name {
        tracing::info!(%name, "naming output after uploader");
        options.output_template = output_template(&request.destination, Some(name));
    }

    let mut tracker = ProgressTracker::default();
    let mut on_progress = |raw: RawProgress| {
        if let Some(fraction) = tracker.observe(&raw) {
            let _ = events.send(ProgressEvent::downloading(fraction));
        }
    };
    extractor
        .download(&request.url, &options, &mut on_progress)
        .await
        .map_err(JobError::Download)?;

    tracing::info!(url = %request.url, "download finished");
    Ok(())
}

struct ActiveJob {
    id: u64,
    events: UnboundedReceiver<ProgressEvent>,
}

/// Owns the single job slot. Lives on the UI thread.
pub struct JobController {
    extractor: Arc<dyn Extractor>,
    cookies: CookiePolicy,
    active: Option<ActiveJob>,
    next_id: u64,
}

impl JobController {
    pub fn new(extractor: Arc<dyn Extractor>, cookies: CookiePolicy) -> Self {
        Self { extractor, cookies, active: None, next_id: 1 }
    }

    /// Whether the download trigger should be enabled.
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Validates and starts a job on `handle`. Rejects while another job is running.
    pub fn submit(
        &mut self,
        handle: &Handle,
        url: &str,
        destination: Option<&str>,
    ) -> Result<u64, JobError> {
        if self.active.is_some() {
            return Err(JobError::Busy);
        }
        let request = validate(url, destination)?;

        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = unbounded_channel();
        let extractor = Arc::clone(&self.extractor);
        let cookies = self.cookies.clone();

        tracing::info!(id, url = %request.url, dest = %request.destination.display(), "starting job");
        handle.spawn(async move {
            if let Err(e) = run_job(extractor.as_ref(), &request, &cookies, &tx).await {
                tracing::warn!(id, error = %e, "job failed");
            }
        });
        self.active = Some(ActiveJob { id, events: rx });
        Ok(id)
    }

    /// Drains pending events for the active job. The slot is freed on a terminal
    /// event, or with a synthesised `Failed` event if the worker vanished.
    pub fn poll(&mut self) -> Vec<ProgressEvent> {
        let mut drained = Vec::new();
        let Some(job) = self.active.as_mut() else {
            return drained;
        };
        loop {
            match job.events.try_recv() {
                Ok(event) => {
                    let terminal = event.phase.is_terminal();
                    drained.push(event);
                    if terminal {
                        self.active = None;
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::error!(id = job.id, "worker stopped without reporting a result");
                    drained.push(ProgressEvent::failed("the download worker stopped unexpectedly"));
                    self.active = None;
                    break;
                }
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ExtractorError,
        model::{Phase, VideoInfo},
    };
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted stand-in for yt-dlp.
    #[derive(Default)]
    struct FakeExtractor {
        info: Option<VideoInfo>,
        progress: Vec<(u64, u64)>,
        fail_download: bool,
        panic_on_metadata: bool,
        metadata_calls: AtomicUsize,
        download_calls: AtomicUsize,
        templates: Mutex<Vec<DownloadOptions>>,
    }

    impl FakeExtractor {
        fn titled(title: &str) -> Self {
            Self {
                info: Some(VideoInfo { title: title.into(), ..Default::default() }),
                progress: vec![(0, 100), (25, 100), (50, 100), (100, 100)],
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn extract_metadata(
            &self,
            _url: &str,
            options: &DownloadOptions,
        ) -> Result<VideoInfo, ExtractorError> {
            self.metadata_calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_metadata {
                panic!("extractor crashed");
            }
            self.templates.lock().unwrap().push(options.clone());
            self.info.clone().ok_or_else(|| ExtractorError::Failed {
                code: Some(1),
                stderr: "ERROR: Private video".into(),
            })
        }

        async fn download(
            &self,
            _url: &str,
            options: &DownloadOptions,
            on_progress: &mut (dyn FnMut(RawProgress) + Send),
        ) -> Result<(), ExtractorError> {
            self.download_calls.fetch_add(1, Ordering::SeqCst);
            self.templates.lock().unwrap().push(options.clone());
            for &(done, total) in &self.progress {
                on_progress(RawProgress::downloading(done, total));
            }
            if self.fail_download {
                return Err(ExtractorError::Failed { code: Some(1), stderr: "ERROR: No space left".into() });
            }
            Ok(())
        }
    }

    fn collect(mut rx: UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn run(fake: &FakeExtractor, url: &str, dest: &str) -> (Result<(), JobError>, Vec<ProgressEvent>) {
        let (tx, rx) = unbounded_channel();
        let request = JobRequest { url: url.into(), destination: dest.into() };
        let result = run_job(fake, &request, &CookiePolicy::default(), &tx).await;
        drop(tx);
        (result, collect(rx))
    }

    #[test]
    fn title_preview_truncates_on_characters() {
        assert_eq!(title_preview("Test Video"), "Test Video...");
        let long = "あ".repeat(40);
        assert_eq!(title_preview(&long), format!("{}...", "あ".repeat(35)));
    }

    #[test]
    fn validation_rejects_bad_input() {
        assert!(matches!(validate("ftp://example.com/x", Some("/tmp")), Err(JobError::InvalidUrl(_))));
        assert!(matches!(
            validate("https://x.com/a/status/1", None),
            Err(JobError::MissingDestination)
        ));
        assert!(matches!(
            validate("https://x.com/a/status/1", Some("  ")),
            Err(JobError::MissingDestination)
        ));
        let request = validate("https://x.com/a/status/1", Some("/tmp")).unwrap();
        assert_eq!(request.destination, PathBuf::from("/tmp"));
    }

    #[tokio::test]
    async fn successful_job_emits_fetch_progress_complete() {
        let fake = FakeExtractor::titled("Test Video");
        let (result, events) = run(&fake, "https://www.youtube.com/watch?v=abc123", "/dest").await;
        assert!(result.is_ok());

        assert_eq!(events.first(), Some(&ProgressEvent::fetched("Test Video...".into())));
        assert_eq!(events.last(), Some(&ProgressEvent::completed()));

        let fractions: Vec<f32> = events
            .iter()
            .filter(|e| e.phase == Phase::Downloading)
            .map(|e| e.fraction.unwrap())
            .collect();
        assert_eq!(fractions, vec![0.0, 0.25, 0.5, 1.0]);
        assert_eq!(events.len(), 6);
    }

    #[tokio::test]
    async fn youtube_keeps_title_template_and_skips_cookies() {
        let fake = FakeExtractor::titled("Test Video");
        run(&fake, "https://www.youtube.com/watch?v=abc123", "/dest").await.0.unwrap();
        let seen = fake.templates.lock().unwrap();
        let download = seen.last().unwrap();
        assert_eq!(download.output_template, output_template(std::path::Path::new("/dest"), None));
        assert_eq!(download.cookies_from_browser, None);
    }

    #[tokio::test]
    async fn tiktok_output_is_named_after_handle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::File::create(dir.path().join("alice.mp4")).unwrap();
        let fake = FakeExtractor::titled("dance");
        let dest = dir.path().to_str().unwrap();

        run(&fake, "https://www.tiktok.com/@alice/video/123", dest).await.0.unwrap();

        let seen = fake.templates.lock().unwrap();
        let download = seen.last().unwrap();
        assert_eq!(download.output_template, output_template(dir.path(), Some("alice_1")));
        assert_eq!(download.cookies_from_browser.as_deref(), Some("firefox"));
    }

    #[tokio::test]
    async fn metadata_failure_never_downloads() {
        let fake = FakeExtractor { info: None, ..Default::default() };
        let (result, events) = run(&fake, "https://x.com/bob/status/1", "/dest").await;

        assert!(matches!(result, Err(JobError::MetadataFetch(_))));
        assert_eq!(fake.download_calls.load(Ordering::SeqCst), 0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, Phase::Failed);
        assert!(events[0].message.as_deref().unwrap().contains("Private video"));
    }

    #[tokio::test]
    async fn collision_exhaustion_fails_before_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::File::create(dir.path().join("bob.mp4")).unwrap();
        for i in 1..=99 {
            std::fs::File::create(dir.path().join(format!("bob_{i}.mp4"))).unwrap();
        }
        let fake = FakeExtractor {
            info: Some(VideoInfo { title: "t".into(), uploader_id: Some("bob".into()), ..Default::default() }),
            ..Default::default()
        };
        let (result, events) = run(&fake, "https://x.com/bob/status/1", dir.path().to_str().unwrap()).await;

        assert!(matches!(result, Err(JobError::CollisionExhausted { .. })));
        assert_eq!(fake.download_calls.load(Ordering::SeqCst), 0);
        let phases: Vec<Phase> = events.iter().map(|e| e.phase).collect();
        assert_eq!(phases, vec![Phase::Fetching, Phase::Failed]);
    }

    #[tokio::test]
    async fn download_failure_is_terminal_failed_event() {
        let fake = FakeExtractor { fail_download: true, ..FakeExtractor::titled("clip") };
        let (result, events) = run(&fake, "https://www.instagram.com/reel/x/", "/dest").await;

        assert!(matches!(result, Err(JobError::Download(_))));
        let last = events.last().unwrap();
        assert_eq!(last.phase, Phase::Failed);
        assert!(last.message.as_deref().unwrap().contains("No space left"));
        assert_eq!(events.iter().filter(|e| e.phase.is_terminal()).count(), 1);
    }

    async fn poll_until_idle(controller: &mut JobController) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while !controller.is_idle() {
            events.extend(controller.poll());
            tokio::task::yield_now().await;
        }
        events
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn controller_runs_one_job_at_a_time() {
        let fake = Arc::new(FakeExtractor::titled("Test Video"));
        let mut controller = JobController::new(fake.clone(), CookiePolicy::default());
        let handle = Handle::current();
        assert!(controller.is_idle());

        let id = controller
            .submit(&handle, "https://www.youtube.com/watch?v=abc123", Some("/dest"))
            .unwrap();
        assert!(!controller.is_idle());
        assert!(matches!(
            controller.submit(&handle, "https://x.com/a/status/1", Some("/dest")),
            Err(JobError::Busy)
        ));

        let events = poll_until_idle(&mut controller).await;
        assert_eq!(events.last(), Some(&ProgressEvent::completed()));
        assert!(controller.is_idle());
        assert_eq!(fake.metadata_calls.load(Ordering::SeqCst), 1);

        let next = controller
            .submit(&handle, "https://www.youtube.com/shorts/xyz", Some("/dest"))
            .unwrap();
        assert_ne!(next, id);
        poll_until_idle(&mut controller).await;
    }

    #[tokio::test]
    async fn invalid_submission_spawns_nothing() {
        let fake = Arc::new(FakeExtractor::titled("x"));
        let mut controller = JobController::new(fake.clone(), CookiePolicy::default());

        let err = controller.submit(&Handle::current(), "ftp://example.com/x", Some("/dest")).unwrap_err();
        assert!(err.is_invalid_input());
        let err = controller.submit(&Handle::current(), "https://x.com/a", None).unwrap_err();
        assert!(err.is_invalid_input());

        assert!(controller.is_idle());
        assert!(controller.poll().is_empty());
        tokio::task::yield_now().await;
        assert_eq!(fake.metadata_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn crashed_worker_still_frees_the_slot() {
        let fake = Arc::new(FakeExtractor { panic_on_metadata: true, ..FakeExtractor::titled("x") });
        let mut controller = JobController::new(fake, CookiePolicy::default());
        controller.submit(&Handle::current(), "https://x.com/a/status/1", Some("/dest")).unwrap();

        let events = poll_until_idle(&mut controller).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, Phase::Failed);
    }
}
