//! Desktop video downloader: paste a URL, pick a folder, download through yt-dlp.

// Persisted preferences (download folder, cookie policy)
mod config;
// yt-dlp process driver behind the `Extractor` trait
mod downloader;
// Error types for jobs and the extractor
mod error;
// tracing subscriber setup
mod logging;
// Data models for jobs and progress events
mod model;
// Output file naming and collision avoidance
mod naming;
// Progress parsing utilities
mod progress;
// Job lifecycle and the single job slot
mod runner;
// Supported URL prefixes
mod validator;

use std::sync::Arc;

use config::{CONFIG_FILE, ConfigStore};
use downloader::{Asset, YtDlp};
use model::{Phase, ProgressEvent};
use runner::JobController;

// eframe/egui for GUI application framework
use eframe::{App, Frame, egui};
// FileDialog for folder selection dialogs
use rfd::FileDialog;
use tokio::runtime::{Handle, Runtime};

/// Program entry point: initializes logging and runtime, then launches the GUI
fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing();

    // Jobs run here; the runtime must outlive the window
    let rt = Runtime::new()?;
    let handle = rt.handle().clone();

    // Extracting a bundled yt-dlp writes to disk, so it happens before the window exists
    let ytdlp = Arc::new(YtDlp::locate());
    tracing::info!(binary = %ytdlp.binary().display(), "using yt-dlp");

    let mut viewport = egui::ViewportBuilder::default().with_inner_size([550.0, 300.0]);
    if let Some(icon) = load_icon() {
        viewport = viewport.with_icon(icon);
    }
    let options = eframe::NativeOptions { viewport, ..Default::default() };

    eframe::run_native(
        "Video Downloader",
        options,
        Box::new(move |_cc| Box::new(DownloaderApp::new(handle, ytdlp))),
    )?;
    Ok(())
}

/// Decodes the embedded window icon. A broken icon only costs the icon.
fn load_icon() -> Option<egui::IconData> {
    let file = Asset::get("logo.png")?;
    match image::load_from_memory(&file.data) {
        Ok(img) => {
            let img = img.to_rgba8();
            let (width, height) = img.dimensions();
            Some(egui::IconData { rgba: img.into_raw(), width, height })
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not decode window icon");
            None
        }
    }
}

/// Application state for the GUI
struct DownloaderApp {
    /// Runtime the download jobs are spawned on
    runtime: Handle,
    /// Persisted download folder
    config: ConfigStore,
    /// Single job slot; owns the event channel of the running job
    jobs: JobController,
    /// Input field for the video URL
    url_input: String,
    /// Lines shown in the status box
    status: Vec<String>,
    /// Progress bar value (0.0 to 1.0)
    progress: f32,
    /// Message for the modal error window
    error: Option<String>,
}

impl DownloaderApp {
    fn new(runtime: Handle, extractor: Arc<YtDlp>) -> Self {
        let config = ConfigStore::load(CONFIG_FILE);
        let jobs = JobController::new(extractor, config.config().cookie_policy());
        Self {
            runtime,
            config,
            jobs,
            url_input: String::new(),
            status: Vec::new(),
            progress: 0.0,
            error: None,
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status.clear();
        self.status.push(message.into());
    }

    fn append_status(&mut self, message: impl Into<String>) {
        self.status.push(message.into());
    }

    fn start_download(&mut self) {
        self.progress = 0.0;
        let url = self.url_input.trim().to_owned();
        match self.jobs.submit(&self.runtime, &url, self.config.download_dir()) {
            Ok(_) => self.set_status("Fetching video info..."),
            Err(e) => {
                if !e.is_invalid_input() {
                    tracing::warn!(error = %e, "download not started");
                }
                self.error = Some(e.to_string());
            }
        }
    }

    fn choose_directory(&mut self) {
        let mut dialog = FileDialog::new();
        if let Some(dir) = self.config.download_dir() {
            dialog = dialog.set_directory(&dir);
        }
        if let Some(folder) = dialog.pick_folder() {
            self.config.set_download_dir(folder.display().to_string());
        }
    }

    /// Applies a worker event to the widgets. Only ever called on the UI thread.
    fn apply(&mut self, event: ProgressEvent) {
        match event.phase {
            Phase::Fetching => {
                if let Some(title) = event.message {
                    self.set_status(title);
                }
            }
            Phase::Downloading => {
                if let Some(fraction) = event.fraction {
                    self.progress = fraction;
                }
            }
            Phase::Completed => {
                self.progress = 1.0;
                self.append_status("Download complete");
            }
            Phase::Failed => {
                self.append_status("Error");
                let detail = event.message.unwrap_or_default();
                self.error = Some(format!("An error occurred while downloading.\n{detail}"));
            }
        }
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // Apply everything the worker sent since the last frame
        for event in self.jobs.poll() {
            self.apply(event);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            // Folder selection
            ui.horizontal(|ui| {
                let dir = self.config.download_dir().unwrap_or("(not selected)");
                ui.label(format!("Save to: {dir}"));
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Choose…").clicked() {
                        self.choose_directory();
                    }
                });
            });

            // URL input and Download button, disabled while a job runs
            ui.horizontal(|ui| {
                let idle = self.jobs.is_idle();
                let input = ui.add(
                    egui::TextEdit::singleline(&mut self.url_input)
                        .hint_text("Paste a video URL")
                        .desired_width(ui.available_width() - 80.0),
                );
                let button = ui.add_enabled(idle, egui::Button::new("Download"));
                let submitted = input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if button.clicked() || (submitted && idle) {
                    self.start_download();
                }
            });

            ui.separator();
            egui::ScrollArea::vertical()
                .max_height(120.0)
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for line in &self.status {
                        ui.label(line);
                    }
                });

            ui.add_space(8.0);
            ui.add(egui::ProgressBar::new(self.progress).show_percentage());
        });

        // Modal error window
        if let Some(message) = self.error.clone() {
            egui::Window::new("Error")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label(message);
                    if ui.button("OK").clicked() {
                        self.error = None;
                    }
                });
        }

        // Request periodic repaint for progress updates
        if !self.jobs.is_idle() {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}
