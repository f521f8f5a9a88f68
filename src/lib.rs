//! Core of the musicube desktop music grabber: preference storage and the
//! download orchestration subsystem. The UI layer (here, the CLI binary)
//! submits [`downloader::DownloadRequest`]s and consumes normalized
//! [`downloader::ProgressEvent`]s from a single receiver; everything else
//! happens on per-job worker tasks driving the external downloader tools.

pub mod config;
pub mod downloader;
pub mod errors;

pub use config::{PreferenceStore, Preferences};
pub use downloader::{
    Backend, DownloadJob, DownloadManager, DownloadRequest, EventBus, JobEvent, JobId, JobState,
    ProgressEvent,
};
pub use errors::{AppError, Result};
