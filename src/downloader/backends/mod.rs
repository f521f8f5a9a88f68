pub mod spotdl;
pub mod ytdlp;

use std::path::Path;
use tokio::process::Command;

use super::{Backend, DownloadRequest, ProgressEvent};

impl Backend {
    /// Build the external tool invocation for `request`, writing into
    /// `download_dir`. Stdout and stderr are piped by the worker and read
    /// as one merged line stream.
    pub fn command(&self, request: &DownloadRequest, download_dir: &Path) -> Command {
        match self {
            Backend::Video => ytdlp::command(request, download_dir),
            Backend::Streaming => spotdl::command(request, download_dir),
        }
    }

    /// Translate one line of raw tool output into at most one normalized
    /// event. Unrecognized lines yield `None`; the tools print plenty of
    /// text we have no use for.
    pub fn parse_line(&self, line: &str) -> Option<ProgressEvent> {
        match self {
            Backend::Video => ytdlp::parse_line(line),
            Backend::Streaming => spotdl::parse_line(line),
        }
    }

    /// Generic completion event for this backend. Neither tool reports a
    /// usable per-track artist/title on its progress stream, so completion
    /// is announced with a fixed display pair and no cover art.
    pub fn finished_event(&self) -> ProgressEvent {
        let artist = match self {
            Backend::Video => "Video Download",
            Backend::Streaming => "Streaming Download",
        };
        ProgressEvent::Finished {
            artist: artist.to_string(),
            title: "Completed".to_string(),
            cover: None,
        }
    }
}
