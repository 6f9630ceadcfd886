//! OS termination signals, turned into a supervisor shutdown request.
//!
//! The supervisor itself is thread based, so the listener runs a small
//! current-thread tokio runtime on a thread of its own.

use crate::watchdog::{ShutdownHandle, Trigger};

use std::{
    io,
    thread::{self, JoinHandle},
};

#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {},
        _ = sighup.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> io::Result<()> { tokio::signal::ctrl_c().await }

/// Spawn the listener thread. It requests `Trigger::Interrupt` on the first
/// signal and then exits; it is never joined.
pub fn listen(handle: ShutdownHandle) -> io::Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

    thread::Builder::new().name(String::from("signal-listener")).spawn(move || {
        match runtime.block_on(wait_for_shutdown_signal()) {
            Ok(()) => {
                log::info!("[signals] termination signal received");
                handle.shutdown(Trigger::Interrupt);
            }
            Err(err) => log::warn!("[signals] unable to listen for termination signals: {err}"),
        }
    })
}
