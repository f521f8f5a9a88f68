use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to spawn downloader: {0}")]
    Spawn(String),

    #[error("Download error: {0}")]
    Download(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
