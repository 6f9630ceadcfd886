use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A named background thread that can be joined with a deadline.
///
/// `std` has no timed join, so the thread reports its own exit through a
/// channel; the sender lives in a guard so unwinding reports it too.
#[derive(Debug)]
pub(crate) struct Worker {
    handle: JoinHandle<()>,
    done: mpsc::Receiver<()>,
}

struct Finished(mpsc::Sender<()>);

impl Drop for Finished {
    fn drop(&mut self) { let _ = self.0.send(()); }
}

impl Worker {
    pub(crate) fn spawn<F>(name: String, body: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, done) = mpsc::channel();
        let handle = thread::Builder::new().name(name).spawn(move || {
            let _finished = Finished(tx);
            body();
        })?;

        Ok(Self { handle, done })
    }

    pub(crate) fn is_current(&self) -> bool { self.handle.thread().id() == thread::current().id() }

    /// Wait up to `timeout` for the thread to exit.
    ///
    /// Returns `false` when the deadline passed; the thread is then detached
    /// and left to finish on its own. Joining from inside the worker itself
    /// detaches immediately and counts as joined, since the caller is about
    /// to unwind back into the loop that is already on its way out.
    pub(crate) fn join(self, timeout: Duration) -> bool {
        if self.is_current() {
            return true;
        }

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = self.handle.join();
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}
