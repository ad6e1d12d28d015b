//! Polls the config file and reports changes.
//!
//! The watcher compares the file's modification time and length on every
//! tick. A change is reported once per observed difference; a file that
//! disappears is remembered silently and reported again when it comes back.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// What the watcher remembers about the file between ticks.
type Fingerprint = Option<(SystemTime, u64)>;

/// Handle to a running config watcher task.
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    /// Start polling `path` every `interval`, sending `event()` on change.
    ///
    /// The task ends by itself once the receiver is dropped.
    pub fn spawn<T: Send + 'static>(
        path: PathBuf,
        interval: Duration,
        tx: mpsc::Sender<T>,
        event: impl Fn() -> T + Send + 'static,
    ) -> Self {
        let watched = path.clone();
        let task = tokio::spawn(async move {
            let mut last = fingerprint(&watched).await;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // First tick completes immediately

            loop {
                ticker.tick().await;
                let current = fingerprint(&watched).await;
                if current == last {
                    continue;
                }
                last = current;
                if current.is_none() {
                    debug!("Config file {} disappeared", watched.display());
                    continue;
                }

                debug!("Config file {} changed", watched.display());
                if tx.send(event()).await.is_err() {
                    break; // Daemon shutting down
                }
            }
        });

        Self { path, task }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop polling.
    pub fn stop(self) {
        self.task.abort();
    }
}

async fn fingerprint(path: &Path) -> Fingerprint {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    let modified = metadata.modified().ok()?;
    Some((modified, metadata.len()))
}
