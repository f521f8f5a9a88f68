pub mod backends;
pub mod events;
pub mod manager;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

pub use events::{EventBus, EventSender, JobEvent, ProgressEvent};
pub use manager::DownloadManager;

/// Identifier for one download job, attributing events back to the
/// request that produced them.
pub type JobId = Uuid;

/// One download request as submitted by the user. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    /// Quality label or numeric bitrate, e.g. "320 kbps (High)".
    pub quality: String,
    /// Target audio container extension, lowercase.
    pub format: String,
    /// When set, ignore `quality` and ask the tool for the best it can do.
    pub auto_best_audio: bool,
}

impl DownloadRequest {
    pub fn new(
        url: impl Into<String>,
        quality: impl Into<String>,
        format: impl Into<String>,
        auto_best_audio: bool,
    ) -> Self {
        Self {
            url: url.into(),
            quality: quality.into(),
            format: format.into().to_lowercase(),
            auto_best_audio,
        }
    }
}

/// Which external downloader tool handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// Streaming-service tracks, handled by spotdl.
    Streaming,
    /// Everything else, handled by yt-dlp.
    Video,
}

impl Backend {
    /// Route a URL to its backend. A plain substring test: any URL
    /// mentioning the streaming service goes to spotdl, the rest to
    /// yt-dlp. Malformed URLs pass through and fail at the process layer.
    pub fn for_url(url: &str) -> Self {
        if url.contains("spotify.com") {
            Backend::Streaming
        } else {
            Backend::Video
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Running,
    Completed,
    Failed,
}

/// Registry record for one in-flight or finished download.
///
/// The child process handle itself lives inside the worker task and is
/// released when the worker returns; this record only mirrors the state
/// the worker reports.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadJob {
    pub id: JobId,
    pub request: DownloadRequest,
    pub backend: Backend,
    /// Directory captured at dispatch time; later path changes do not
    /// affect this job.
    pub download_dir: PathBuf,
    pub state: JobState,
    /// Last reported fraction in [0.0, 1.0].
    pub progress: f32,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_is_a_pure_function_of_the_url() {
        assert_eq!(
            Backend::for_url("https://open.spotify.com/track/abc"),
            Backend::Streaming
        );
        assert_eq!(
            Backend::for_url("https://www.youtube.com/watch?v=abc"),
            Backend::Video
        );
        assert_eq!(Backend::for_url("not a url at all"), Backend::Video);
        assert_eq!(
            Backend::for_url("https://example.com/?ref=spotify.com"),
            Backend::Streaming
        );
    }

    #[test]
    fn request_lowercases_format() {
        let req = DownloadRequest::new("https://x", "320 kbps (High)", "FLAC", false);
        assert_eq!(req.format, "flac");
    }
}
