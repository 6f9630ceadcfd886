/// Presentation layer hooks called by the supervisor.
///
/// `show` runs once after all monitors are started; `notify_quit` then `hide`
/// run once during shutdown, whatever triggered it. The inbound direction
/// (a user asking to quit) goes through [`ShutdownHandle::quit`](super::ShutdownHandle::quit).
/// `show` runs before `start` returns and must not request shutdown on the
/// calling thread.
pub trait StatusSurface: Send + Sync {
    fn show(&self);
    fn hide(&self);
    fn notify_quit(&self);
}

/// Surface for headless runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSurface;

impl StatusSurface for NullSurface {
    fn show(&self) {}
    fn hide(&self) {}
    fn notify_quit(&self) {}
}
