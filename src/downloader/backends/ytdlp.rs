//! Translator for yt-dlp, the generic video-site backend.
//!
//! yt-dlp has no machine-readable progress channel, but its human output
//! is regular enough to scrape: `[download]  23.5% of 10.00MiB at ...`
//! lines during transfer, then an `[ExtractAudio]` line once conversion
//! starts. Everything else is ignored.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tokio::process::Command;

use crate::downloader::{DownloadRequest, ProgressEvent};

/// yt-dlp's `--audio-quality` sentinel for "best available".
const BEST_QUALITY: &str = "0";

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").unwrap())
}

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

/// Resolve the `--audio-quality` argument from the request.
///
/// Auto-best always wins. Otherwise the first run of digits in the
/// quality label is the target bitrate ("320 kbps (High)" -> "320");
/// a label with no digits falls back to best available.
pub fn resolve_quality(request: &DownloadRequest) -> String {
    if request.auto_best_audio {
        return BEST_QUALITY.to_string();
    }
    digits_re()
        .find(&request.quality)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| BEST_QUALITY.to_string())
}

pub fn command(request: &DownloadRequest, download_dir: &Path) -> Command {
    let output_template = format!("{}/%(title)s.%(ext)s", download_dir.display());
    let mut cmd = Command::new("yt-dlp");
    cmd.arg("-x")
        .arg("--audio-format")
        .arg(&request.format)
        .arg("--audio-quality")
        .arg(resolve_quality(request))
        .arg("-o")
        .arg(output_template)
        .arg("--no-playlist")
        .arg(&request.url);
    cmd
}

pub fn parse_line(line: &str) -> Option<ProgressEvent> {
    // Conversion runs after the transfer finishes; call it almost done.
    if line.contains("[ExtractAudio]") {
        return Some(ProgressEvent::Progress { fraction: 0.95 });
    }
    if let Some(caps) = percent_re().captures(line) {
        if let Ok(percent) = caps[1].parse::<f32>() {
            return Some(ProgressEvent::Progress {
                fraction: percent / 100.0,
            });
        }
    }
    None
}
