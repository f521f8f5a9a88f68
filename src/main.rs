use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use musicube::downloader::{DownloadManager, DownloadRequest, EventBus, JobId, ProgressEvent};
use musicube::PreferenceStore;

/// Download tracks or videos as audio files using the external
/// downloader tools (yt-dlp, spotdl).
#[derive(Parser, Debug)]
#[command(name = "musicube", version, about)]
struct Cli {
    /// One or more track or video URLs.
    #[arg(required = true)]
    urls: Vec<String>,

    /// Audio format extension (mp3, m4a, flac, wav). Defaults to the
    /// saved preference.
    #[arg(long)]
    format: Option<String>,

    /// Quality label, e.g. "320 kbps (High)". Defaults to the saved
    /// preference. Ignored when auto-best is on.
    #[arg(long)]
    quality: Option<String>,

    /// Let the tool pick the best available audio quality.
    #[arg(long, conflicts_with = "no_best")]
    best: bool,

    /// Use the quality label instead of auto-best.
    #[arg(long)]
    no_best: bool,

    /// Download directory. Defaults to the saved preference.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

/// One list row per download, the console stand-in for the UI widget.
struct Row {
    label: String,
    failed: bool,
}

impl Row {
    fn new(label: String) -> Self {
        Self { label, failed: false }
    }

    fn on_progress(&self, fraction: f32) {
        println!("[{:>3.0}%] {}", fraction * 100.0, self.label);
    }

    fn on_stage(&self, stage: &str) {
        println!("[    ] {}: {}", self.label, stage);
    }

    fn on_finished(&self, artist: &str, title: &str, _cover: Option<&std::path::Path>) {
        println!("[done] {}: {} - {}", self.label, artist, title);
    }

    fn on_failed(&mut self, message: &str) {
        self.failed = true;
        eprintln!("[fail] {}: {}", self.label, message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let store = PreferenceStore::open_default();
    let prefs = store.get();

    let format = cli.format.unwrap_or_else(|| prefs.format.clone());
    let quality = cli.quality.unwrap_or_else(|| prefs.quality.clone());
    let auto_best = if cli.best {
        true
    } else if cli.no_best {
        false
    } else {
        prefs.auto_best_audio
    };
    let download_dir = cli.output.unwrap_or_else(|| prefs.download_path.clone());

    info!("Downloading {} item(s) to {:?}", cli.urls.len(), download_dir);

    let (events, mut rx) = EventBus::channel();
    let manager = DownloadManager::new(download_dir, events);

    let mut rows: HashMap<JobId, Row> = HashMap::new();
    for url in &cli.urls {
        if url.trim().is_empty() {
            continue;
        }
        let request = DownloadRequest::new(url.clone(), quality.clone(), format.clone(), auto_best);
        let id = manager.start(request).await;
        rows.insert(id, Row::new(url.clone()));
    }

    // Single consumer context: drain the bridge until every job has
    // reported its terminal event.
    let mut remaining = rows.len();
    while remaining > 0 {
        let Some(ev) = rx.recv().await else { break };
        let Some(row) = rows.get_mut(&ev.job) else { continue };
        match ev.event {
            ProgressEvent::Progress { fraction } => row.on_progress(fraction),
            ProgressEvent::Stage { label } => row.on_stage(&label),
            ProgressEvent::Finished { artist, title, cover } => {
                row.on_progress(1.0);
                row.on_finished(&artist, &title, cover.as_deref());
                remaining -= 1;
            }
            ProgressEvent::Failed { message } => {
                row.on_failed(&message);
                remaining -= 1;
            }
        }
    }

    if rows.values().any(|row| row.failed) {
        std::process::exit(1);
    }
    Ok(())
}
