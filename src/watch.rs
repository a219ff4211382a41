//! File watcher: republish the snapshot when the watched file changes.
//!
//! Watches the file's parent directory (editors usually replace rather than
//! rewrite in place), coalesces event bursts behind a debounce window, and
//! rebuilds once per quiescent burst. The returned handle must be kept
//! alive — dropping it stops the watcher.

use crate::snapshot::Snapshot;
use crate::store::FileStore;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Debounce window: wait this long after the last event before rebuilding.
const DEBOUNCE_MS: u64 = 500;

/// Rebuild attempts per burst before keeping the old snapshot.
const RELOAD_ATTEMPTS: u32 = 5;

/// Base delay between rebuild attempts; grows linearly per attempt.
const RETRY_DELAY_MS: u64 = 100;

/// Start watching `path` and publishing rebuilt snapshots into `store`.
pub fn start_watcher(path: PathBuf, store: Arc<FileStore>) -> Option<RecommendedWatcher> {
    let (tx, rx) = mpsc::channel::<Event>();

    let mut watcher = match RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!(error = %e, "failed to create file watcher");
            return None;
        }
    };

    let watch_root = path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.clone());
    if let Err(e) = watcher.watch(&watch_root, RecursiveMode::NonRecursive) {
        error!(path = %watch_root.display(), error = %e, "failed to watch");
        return None;
    }
    info!(path = %path.display(), "watching for modifications");

    std::thread::spawn(move || debounce_loop(rx, path, store));

    Some(watcher)
}

/// Collect events for the watched file and rebuild after a quiet period.
fn debounce_loop(rx: mpsc::Receiver<Event>, path: PathBuf, store: Arc<FileStore>) {
    let file_name = path.file_name().map(|n| n.to_os_string());
    let mut pending: Option<Instant> = None;

    loop {
        match rx.recv_timeout(Duration::from_millis(DEBOUNCE_MS)) {
            Ok(event) => {
                let relevant_kind = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                );
                let touches_file = event
                    .paths
                    .iter()
                    .any(|p| p == &path || p.file_name() == file_name.as_deref());
                if relevant_kind && touches_file {
                    pending = Some(Instant::now());
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let Some(last) = pending else { continue };
                if last.elapsed() < Duration::from_millis(DEBOUNCE_MS) {
                    continue;
                }
                pending = None;
                reload_with_retry(&path, &store);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Rebuild and publish; retries cover the editor delete-then-rename window.
fn reload_with_retry(path: &Path, store: &FileStore) {
    for attempt in 0..RELOAD_ATTEMPTS {
        match Snapshot::load(path) {
            Ok(snapshot) => {
                let lines = snapshot.lines.len();
                store.publish(snapshot);
                info!(path = %path.display(), lines, "published new snapshot");
                return;
            }
            Err(e) => {
                debug!(path = %path.display(), attempt, error = %e, "snapshot rebuild failed, retrying");
                std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt + 1)));
            }
        }
    }
    error!(path = %path.display(), "could not re-read watched file, keeping previous snapshot");
}
