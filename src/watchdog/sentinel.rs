use super::{signal::CancellationSignal, worker::Worker};

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// Polls for a marker file and fires once when it appears.
#[derive(Clone, Debug)]
pub struct SentinelWatcher {
    path: PathBuf,
    interval: Duration,
}

impl SentinelWatcher {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self { path: path.into(), interval }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Check for the marker and remove it if present.
    ///
    /// A failed removal is logged and still counts as a detection, so a
    /// marker that cannot be deleted never blocks shutdown.
    pub fn consume(&self) -> bool {
        if !self.path.exists() {
            return false;
        }

        log::info!("[sentinel] found {}, requesting shutdown", self.path.display());

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("[sentinel] failed to remove {}: {err}", self.path.display()),
        }

        true
    }

    pub(crate) fn spawn<F>(self, signal: Arc<CancellationSignal>, on_detect: F) -> io::Result<Worker>
    where
        F: FnOnce() + Send + 'static,
    {
        Worker::spawn(String::from("sentinel-watcher"), move || self.run(&signal, on_detect))
    }

    fn run(&self, signal: &CancellationSignal, on_detect: impl FnOnce()) {
        log::debug!("[sentinel] watching {} every {:?}", self.path.display(), self.interval);

        while !signal.is_set() {
            if self.consume() {
                on_detect();
                return;
            }

            if signal.wait(self.interval) {
                break;
            }
        }

        log::debug!("[sentinel] watcher exiting");
    }
}
