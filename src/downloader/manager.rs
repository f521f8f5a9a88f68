use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::errors::{AppError, Result};

use super::events::{EventSender, ProgressEvent};
use super::{Backend, DownloadJob, DownloadRequest, JobId, JobState};

/// Builds the external command for a job. The default is
/// [`Backend::command`]; tests substitute scripted processes.
type CommandFactory = Arc<dyn Fn(Backend, &DownloadRequest, &Path) -> Command + Send + Sync>;

/// Dispatches download requests onto per-job worker tasks.
///
/// Every `start` call spawns one independent worker immediately; there is
/// no queue and no concurrency cap. Workers report back only through the
/// event sender and the shared job registry, so a fault in one job never
/// touches another job or the consumer.
pub struct DownloadManager {
    download_dir: Arc<Mutex<PathBuf>>,
    jobs: Arc<Mutex<HashMap<JobId, DownloadJob>>>,
    events: EventSender,
    command_factory: CommandFactory,
}

impl DownloadManager {
    pub fn new(download_dir: impl Into<PathBuf>, events: EventSender) -> Self {
        let download_dir = download_dir.into();
        ensure_dir(&download_dir);
        Self {
            download_dir: Arc::new(Mutex::new(download_dir)),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            events,
            command_factory: Arc::new(|backend: Backend, request: &DownloadRequest, dir: &Path| {
                backend.command(request, dir)
            }),
        }
    }

    #[cfg(test)]
    fn with_command_factory(mut self, factory: CommandFactory) -> Self {
        self.command_factory = factory;
        self
    }

    /// Change the directory new downloads are written to. In-flight jobs
    /// keep the directory they captured at dispatch time.
    pub async fn set_download_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        ensure_dir(&path);
        *self.download_dir.lock().await = path;
    }

    pub async fn download_path(&self) -> PathBuf {
        self.download_dir.lock().await.clone()
    }

    /// Start one download. Fire-and-forget: the job is registered, its
    /// worker is spawned, and the id is returned immediately. The caller
    /// is expected to have rejected empty URLs upstream.
    pub async fn start(&self, request: DownloadRequest) -> JobId {
        let id = JobId::new_v4();
        let backend = Backend::for_url(&request.url);
        let download_dir = self.download_dir.lock().await.clone();

        log::info!("Dispatching {:?} download {} for {}", backend, id, request.url);

        let job = DownloadJob {
            id,
            request: request.clone(),
            backend,
            download_dir: download_dir.clone(),
            state: JobState::Running,
            progress: 0.0,
            error: None,
            created_at: chrono::Utc::now(),
            completed_at: None,
        };
        self.jobs.lock().await.insert(id, job);

        let jobs = self.jobs.clone();
        let events = self.events.clone();
        let factory = self.command_factory.clone();
        tokio::spawn(async move {
            let cmd = factory(backend, &request, &download_dir);
            run_worker(id, backend, cmd, events, jobs).await;
        });

        id
    }

    pub async fn job(&self, id: JobId) -> Option<DownloadJob> {
        self.jobs.lock().await.get(&id).cloned()
    }

    pub async fn jobs(&self) -> Vec<DownloadJob> {
        let jobs = self.jobs.lock().await;
        let mut list: Vec<DownloadJob> = jobs.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }
}

fn ensure_dir(path: &Path) {
    if let Err(e) = std::fs::create_dir_all(path) {
        log::warn!("Failed to create download directory {:?}: {}", path, e);
    }
}

/// Worker boundary: everything the process run can go wrong with is
/// caught here and turned into exactly one terminal event for this job.
async fn run_worker(
    id: JobId,
    backend: Backend,
    cmd: Command,
    events: EventSender,
    jobs: Arc<Mutex<HashMap<JobId, DownloadJob>>>,
) {
    let terminal = match stream_process(id, backend, cmd, &events, &jobs).await {
        Ok(()) => backend.finished_event(),
        Err(e) => ProgressEvent::Failed {
            message: e.to_string(),
        },
    };

    {
        let mut jobs = jobs.lock().await;
        if let Some(job) = jobs.get_mut(&id) {
            match &terminal {
                ProgressEvent::Finished { .. } => {
                    job.state = JobState::Completed;
                    job.progress = 1.0;
                }
                ProgressEvent::Failed { message } => {
                    job.state = JobState::Failed;
                    job.error = Some(message.clone());
                }
                _ => {}
            }
            job.completed_at = Some(chrono::Utc::now());
        }
    }

    match &terminal {
        ProgressEvent::Failed { message } => log::error!("Download {} failed: {}", id, message),
        _ => log::info!("Download {} completed", id),
    }
    events.send(id, terminal);
}

/// Launch the external process and translate its merged stdout/stderr
/// line stream into progress events until it exits. The child handle is
/// owned here and released when the function returns.
async fn stream_process(
    id: JobId,
    backend: Backend,
    mut cmd: Command,
    events: &EventSender,
    jobs: &Arc<Mutex<HashMap<JobId, DownloadJob>>>,
) -> Result<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| AppError::Spawn(format!("{:?}: {}", cmd.as_std().get_program(), e)))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut stdout_lines = stdout.map(|s| BufReader::new(s).lines());
    let mut stderr_lines = stderr.map(|s| BufReader::new(s).lines());

    // Read both pipes as one merged stream, the way the tools are meant
    // to be watched. Progress may arrive on either.
    loop {
        let stdout_open = stdout_lines.is_some();
        let stderr_open = stderr_lines.is_some();
        if !stdout_open && !stderr_open {
            break;
        }
        let line = tokio::select! {
            line = next_line(&mut stdout_lines), if stdout_open => {
                if line.is_none() { stdout_lines = None; continue; }
                line
            }
            line = next_line(&mut stderr_lines), if stderr_open => {
                if line.is_none() { stderr_lines = None; continue; }
                line
            }
            else => break,
        };

        if let Some(line) = line {
            log::trace!("[{}] {}", id, line);
            if let Some(event) = backend.parse_line(&line) {
                if let ProgressEvent::Progress { fraction } = event {
                    let mut jobs = jobs.lock().await;
                    if let Some(job) = jobs.get_mut(&id) {
                        job.progress = fraction;
                    }
                }
                events.send(id, event);
            }
        }
    }

    let status = child.wait().await?;
    if !status.success() {
        let message = match status.code() {
            Some(code) => format!("downloader exited with status {}", code),
            None => "downloader terminated by signal".to_string(),
        };
        return Err(AppError::Download(message));
    }
    Ok(())
}

async fn next_line(
    lines: &mut Option<tokio::io::Lines<BufReader<impl tokio::io::AsyncRead + Unpin>>>,
) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::events::{EventBus, JobEvent};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script.to_string());
        cmd
    }

    fn scripted_manager(script: &'static str) -> (DownloadManager, UnboundedReceiver<JobEvent>) {
        let (tx, rx) = EventBus::channel();
        let dir = std::env::temp_dir();
        let manager = DownloadManager::new(dir, tx)
            .with_command_factory(Arc::new(move |_: Backend, _: &DownloadRequest, _: &Path| sh(script)));
        (manager, rx)
    }

    fn request(url: &str) -> DownloadRequest {
        DownloadRequest::new(url, "320 kbps (High)", "mp3", true)
    }

    async fn collect_job_events(rx: &mut UnboundedReceiver<JobEvent>, job: JobId) -> Vec<ProgressEvent> {
        let mut out = Vec::new();
        while let Some(ev) = rx.recv().await {
            if ev.job != job {
                continue;
            }
            let terminal = ev.event.is_terminal();
            out.push(ev.event);
            if terminal {
                break;
            }
        }
        out
    }

    #[tokio::test]
    async fn scripted_ytdlp_run_produces_ordered_events_and_finished() {
        let (manager, mut rx) = scripted_manager(
            "printf '[youtube] abc: Downloading webpage\n\
             [download]  12.3%% of 5MiB\n\
             [ExtractAudio] Destination: x\n'",
        );
        let id = manager.start(request("https://www.youtube.com/watch?v=abc")).await;

        let events = collect_job_events(&mut rx, id).await;
        assert_eq!(
            events,
            vec![
                ProgressEvent::Progress { fraction: 0.123 },
                ProgressEvent::Progress { fraction: 0.95 },
                ProgressEvent::Finished {
                    artist: "Video Download".into(),
                    title: "Completed".into(),
                    cover: None,
                },
            ]
        );

        let job = manager.job(id).await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 1.0);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn spawn_failure_becomes_a_failed_event() {
        let (tx, mut rx) = EventBus::channel();
        let manager = DownloadManager::new(std::env::temp_dir(), tx).with_command_factory(
            Arc::new(|_: Backend, _: &DownloadRequest, _: &Path| {
                Command::new("/nonexistent/downloader-binary")
            }),
        );
        let id = manager.start(request("https://www.youtube.com/watch?v=abc")).await;

        let events = collect_job_events(&mut rx, id).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ProgressEvent::Failed { .. }));
        assert_eq!(manager.job(id).await.unwrap().state, JobState::Failed);
    }

    #[tokio::test]
    async fn nonzero_exit_becomes_a_failed_event() {
        let (manager, mut rx) =
            scripted_manager("printf '[download]  50.0%% of 5MiB\n'; exit 3");
        let id = manager.start(request("https://www.youtube.com/watch?v=abc")).await;

        let events = collect_job_events(&mut rx, id).await;
        assert_eq!(events[0], ProgressEvent::Progress { fraction: 0.5 });
        match &events[1] {
            ProgressEvent::Failed { message } => assert!(message.contains("3")),
            other => panic!("expected Failed, got {:?}", other),
        }
        let job = manager.job(id).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.error.is_some());
    }

    #[tokio::test]
    async fn progress_on_stderr_is_parsed_too() {
        let (manager, mut rx) =
            scripted_manager("printf '[download]  40.0%% of 5MiB\n' >&2");
        let id = manager.start(request("https://www.youtube.com/watch?v=abc")).await;

        let events = collect_job_events(&mut rx, id).await;
        assert_eq!(events[0], ProgressEvent::Progress { fraction: 0.4 });
        assert!(events[1].is_terminal());
    }

    #[tokio::test]
    async fn streaming_urls_use_the_coarse_translator() {
        let (manager, mut rx) = scripted_manager(
            "printf 'Downloading: Artist - Title\nConverting to mp3\n'",
        );
        let id = manager.start(request("https://open.spotify.com/track/abc")).await;

        let events = collect_job_events(&mut rx, id).await;
        assert_eq!(
            events,
            vec![
                ProgressEvent::Progress { fraction: 0.1 },
                ProgressEvent::Progress { fraction: 0.8 },
                ProgressEvent::Finished {
                    artist: "Streaming Download".into(),
                    title: "Completed".into(),
                    cover: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn concurrent_jobs_each_get_exactly_one_terminal_event() {
        let (manager, mut rx) =
            scripted_manager("printf '[download]  10.0%% of 1MiB\n'");

        let mut ids = Vec::new();
        for i in 0..5 {
            let url = format!("https://www.youtube.com/watch?v={}", i);
            ids.push(manager.start(request(&url)).await);
        }

        // Each job emits one Progress then one Finished.
        let mut terminals: HashMap<JobId, usize> = HashMap::new();
        let mut seen = 0;
        while seen < 10 {
            let ev = rx.recv().await.unwrap();
            assert!(ids.contains(&ev.job));
            if ev.event.is_terminal() {
                *terminals.entry(ev.job).or_default() += 1;
            } else {
                // Per-job ordering: progress never follows the terminal.
                assert!(!terminals.contains_key(&ev.job));
            }
            seen += 1;
        }
        assert_eq!(terminals.len(), 5);
        assert!(terminals.values().all(|&n| n == 1));

        for id in ids {
            assert_eq!(manager.job(id).await.unwrap().state, JobState::Completed);
        }
    }

    #[tokio::test]
    async fn path_change_does_not_affect_dispatched_jobs() {
        let (tx, _rx) = EventBus::channel();
        let first = std::env::temp_dir().join("musicube-first");
        let second = std::env::temp_dir().join("musicube-second");
        let manager = DownloadManager::new(&first, tx).with_command_factory(
            Arc::new(|_: Backend, _: &DownloadRequest, _: &Path| sh("true")),
        );

        let id = manager.start(request("https://www.youtube.com/watch?v=abc")).await;
        manager.set_download_path(&second).await;

        assert_eq!(manager.job(id).await.unwrap().download_dir, first);
        assert_eq!(manager.download_path().await, second);
    }
}
