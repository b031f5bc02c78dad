//! Background tasks that keep the configuration current
//!
//! One task per dynamic source: a stamp poller for the file layers, a
//! remote poller with exponential backoff on failure, and on Unix a SIGHUP
//! listener. All of them stop when the [`WatchHandle`] is shut down; a
//! reload already in progress completes first.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use conf_fs::FileStamp;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::{ConfigEngine, ReloadTrigger};
use crate::settings::RemoteSettings;

/// Handle to the tasks started by [`ConfigEngine::spawn_watchers`]
#[derive(Debug)]
pub struct WatchHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl WatchHandle {
    /// Stop every task and wait for them to exit.
    pub async fn shutdown(self) {
        // Receivers also observe the sender being dropped.
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Watcher task ended abnormally");
            }
        }
        tracing::debug!("Configuration watchers stopped");
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl ConfigEngine {
    /// Start the background watchers. Must be called within a tokio runtime.
    pub fn spawn_watchers(self: &Arc<Self>) -> WatchHandle {
        let (shutdown, rx) = watch::channel(false);
        let mut tasks = vec![
            tokio::spawn(watch_files(
                Arc::clone(self),
                self.settings().watch.file_poll_interval(),
                rx.clone(),
            )),
            tokio::spawn(poll_remote(
                Arc::clone(self),
                self.settings().remote.clone().unwrap_or_default(),
                rx.clone(),
            )),
        ];
        #[cfg(unix)]
        tasks.push(tokio::spawn(reload_on_hangup(Arc::clone(self), rx)));
        #[cfg(not(unix))]
        drop(rx);

        tracing::debug!(tasks = tasks.len(), "Configuration watchers started");
        WatchHandle { shutdown, tasks }
    }
}

async fn watch_files(
    engine: Arc<ConfigEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    // Stamps as last seen by this task, not as last loaded: a file that
    // fails to parse must not trigger a reload on every tick.
    let mut seen: HashMap<PathBuf, Option<FileStamp>> = engine
        .watched_files()
        .await
        .into_iter()
        .map(|(_, path, stamp)| (path, stamp))
        .collect();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let mut changed = None;
                for (layer, path, _) in engine.watched_files().await {
                    let stamp = match FileStamp::read(&path) {
                        Ok(stamp) => stamp,
                        Err(e) => {
                            tracing::warn!(?path, error = %e, "Failed to stat layer file");
                            continue;
                        }
                    };
                    let previous = seen.insert(path.clone(), stamp);
                    if previous != Some(stamp) && changed.is_none() {
                        tracing::debug!(%layer, ?path, "Layer file changed");
                        changed = Some(layer);
                    }
                }
                if let Some(layer) = changed
                    && let Err(e) = engine.reload(ReloadTrigger::FileChanged(layer)).await
                {
                    tracing::warn!(error = %e, "Reload after file change failed");
                }
            }
        }
    }
}

async fn poll_remote(
    engine: Arc<ConfigEngine>,
    settings: RemoteSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    if !engine.has_remote().await {
        return;
    }

    let mut retry = ExponentialBackoffBuilder::new()
        .with_initial_interval(settings.backoff_initial())
        .with_max_interval(settings.backoff_max())
        .with_max_elapsed_time(None)
        .build();
    let mut delay = settings.poll_interval();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {
                if let Err(e) = engine.reload(ReloadTrigger::RemotePoll).await {
                    tracing::warn!(error = %e, "Reload after remote poll failed");
                }
                delay = if engine.remote_healthy() {
                    retry.reset();
                    settings.poll_interval()
                } else {
                    let next = retry.next_backoff().unwrap_or_else(|| settings.backoff_max());
                    tracing::warn!(retry_in = ?next, "Remote layer unavailable");
                    next
                };
            }
        }
    }
}

#[cfg(unix)]
async fn reload_on_hangup(engine: Arc<ConfigEngine>, mut shutdown: watch::Receiver<bool>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGHUP");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                tracing::info!("SIGHUP received, reloading configuration");
                if let Err(e) = engine.reload(ReloadTrigger::Signal).await {
                    tracing::warn!(error = %e, "Reload after SIGHUP failed");
                }
            }
        }
    }
}
