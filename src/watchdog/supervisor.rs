use super::{
    monitor::{Monitor, Probe, State, Stats, contain},
    sentinel::SentinelWatcher,
    signal::CancellationSignal,
    surface::StatusSurface,
    target::Target,
    worker::Worker,
};

use anyhow::{Context, Result, bail};
use once_cell::sync::OnceCell;
use std::{
    fmt, mem,
    path::PathBuf,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// What asked the supervisor to stop. Only the first one is recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
    Sentinel,
    UserQuit,
    Fatal,
    Interrupt,
    Exit,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trigger = match self {
            Trigger::Sentinel => "sentinel file",
            Trigger::UserQuit => "user quit",
            Trigger::Fatal => "fatal error",
            Trigger::Interrupt => "interrupt",
            Trigger::Exit => "process exit",
        };
        f.write_str(trigger)
    }
}

#[derive(Clone, Debug)]
pub struct Options {
    /// Marker file that requests shutdown when it appears. `None` disables the watcher.
    pub sentinel: Option<PathBuf>,
    pub sentinel_interval: Duration,
    /// Upper bound on each thread join during shutdown.
    pub join_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            sentinel: None,
            sentinel_interval: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorStatus {
    pub name: String,
    pub state: State,
    pub stats: Stats,
}

struct Shared {
    signal: Arc<CancellationSignal>,
    started: AtomicBool,
    stopping: AtomicBool,
    finished: CancellationSignal,
    trigger: OnceCell<Trigger>,
    monitors: Mutex<Vec<Monitor>>,
    probes: OnceCell<Vec<Probe>>,
    sentinel: Mutex<Option<Worker>>,
    surface: OnceCell<Arc<dyn StatusSurface>>,
    join_timeout: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

impl Shared {
    fn state(&self) -> State {
        if self.finished.is_set() {
            State::Stopped
        } else if self.stopping.load(Ordering::Acquire) {
            State::Stopping
        } else if self.started.load(Ordering::Acquire) {
            State::Running
        } else {
            State::Idle
        }
    }

    fn monitors(&self) -> Vec<MonitorStatus> {
        self.probes
            .get()
            .map(|probes| {
                probes
                    .iter()
                    .map(|probe| MonitorStatus {
                        name: probe.name().to_string(),
                        state: probe.state(),
                        stats: probe.stats(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The one shutdown path. The first caller does all the work and gets
    /// `true`; everyone else returns `false` straight away.
    fn shutdown(&self, trigger: Trigger) -> bool {
        if self.stopping.swap(true, Ordering::AcqRel) {
            log::debug!("[supervisor] shutdown already in progress, ignoring {trigger}");
            return false;
        }

        let _ = self.trigger.set(trigger);
        log::info!("[supervisor] shutting down ({trigger})");
        self.signal.set();

        // cleanup is best-effort: nothing below may skip the steps after it
        let monitors = mem::take(&mut *lock(&self.monitors));
        let abandoned: Vec<String> = monitors
            .into_iter()
            .filter_map(|mut monitor| (!monitor.stop(self.join_timeout)).then(|| monitor.name().to_string()))
            .collect();

        if let Some(worker) = lock(&self.sentinel).take()
            && !worker.join(self.join_timeout)
        {
            log::warn!("[supervisor] sentinel watcher did not stop within {:?}", self.join_timeout);
        }

        if self.started.load(Ordering::Acquire)
            && let Some(surface) = self.surface.get()
        {
            if let Err(err) = contain(|| {
                surface.notify_quit();
                Ok(())
            }) {
                log::warn!("[supervisor] status surface quit notification failed: {err:#}");
            }
            if let Err(err) = contain(|| {
                surface.hide();
                Ok(())
            }) {
                log::warn!("[supervisor] status surface hide failed: {err:#}");
            }
        }

        match abandoned.is_empty() {
            true => log::info!("[supervisor] stopped"),
            false => log::warn!(
                "[supervisor] stopped, abandoned {} still busy: {}",
                abandoned.len(),
                abandoned.join(", ")
            ),
        }

        self.finished.set();
        true
    }
}

/// Owns the monitors of a set of targets and coordinates their lifecycle.
///
/// Single use: once stopped, build a new one to monitor again. Dropping a
/// started supervisor shuts it down with [`Trigger::Exit`].
pub struct Supervisor {
    targets: Vec<Target>,
    sentinel: Option<SentinelWatcher>,
    shared: Arc<Shared>,
}

impl Supervisor {
    pub fn new(options: Options) -> Self {
        Self {
            targets: Vec::new(),
            sentinel: options.sentinel.map(|path| SentinelWatcher::new(path, options.sentinel_interval)),
            shared: Arc::new(Shared {
                signal: Arc::new(CancellationSignal::new()),
                started: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                finished: CancellationSignal::new(),
                trigger: OnceCell::new(),
                monitors: Mutex::new(Vec::new()),
                probes: OnceCell::new(),
                sentinel: Mutex::new(None),
                surface: OnceCell::new(),
                join_timeout: options.join_timeout,
            }),
        }
    }

    pub fn register(&mut self, target: Target) -> Result<()> {
        if self.shared.started.load(Ordering::Acquire) {
            bail!("cannot register {} after the supervisor has started", target.name());
        }

        if self.targets.iter().any(|known| known.name() == target.name()) {
            bail!("a target named {} is already registered", target.name());
        }

        self.targets.push(target);
        Ok(())
    }

    pub fn set_surface(&mut self, surface: Arc<dyn StatusSurface>) -> Result<()> {
        if self.shared.started.load(Ordering::Acquire) {
            bail!("cannot attach a status surface after the supervisor has started");
        }

        match self.shared.surface.set(surface) {
            Ok(()) => Ok(()),
            Err(_) => bail!("a status surface is already attached"),
        }
    }

    /// Start one monitor per registered target, then the sentinel watcher.
    ///
    /// Returns as soon as every thread is spawned; first checks happen
    /// asynchronously. Calling it again is a no-op.
    pub fn start(&mut self) -> Result<()> {
        // held until startup is complete, so a concurrent shutdown either
        // runs first and is seen here or waits and finds every thread
        let mut monitors = lock(&self.shared.monitors);

        if self.shared.stopping.load(Ordering::Acquire) {
            bail!("supervisor has already been shut down");
        }

        if self.shared.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut probes = Vec::with_capacity(self.targets.len());
        for target in mem::take(&mut self.targets) {
            let mut monitor = Monitor::new(target, Arc::clone(&self.shared.signal));
            probes.push(monitor.probe());

            let started = monitor.start();
            monitors.push(monitor);
            started?;
        }

        let _ = self.shared.probes.set(probes);
        log::info!("[supervisor] started {} monitor(s)", monitors.len());

        if let Some(watcher) = self.sentinel.take() {
            let path = watcher.path().display().to_string();
            let shared = Arc::downgrade(&self.shared);
            let mut slot = lock(&self.shared.sentinel);

            *slot = Some(
                watcher
                    .spawn(Arc::clone(&self.shared.signal), move || {
                        if let Some(shared) = shared.upgrade() {
                            shared.shutdown(Trigger::Sentinel);
                        }
                    })
                    .with_context(|| format!("unable to spawn sentinel watcher for {path}"))?,
            );
            log::info!("[supervisor] sentinel watcher started ({path})");
        }

        if let Some(surface) = self.shared.surface.get()
            && let Err(err) = contain(|| {
                surface.show();
                Ok(())
            })
        {
            log::warn!("[supervisor] status surface failed to show: {err:#}");
        }

        Ok(())
    }

    /// Idempotent; see [`ShutdownHandle::shutdown`].
    pub fn stop(&self, trigger: Trigger) -> bool { self.shared.shutdown(trigger) }

    pub fn state(&self) -> State { self.shared.state() }

    pub fn trigger(&self) -> Option<Trigger> { self.shared.trigger.get().copied() }

    /// Block until shutdown has completed, for at most `timeout`.
    pub fn wait(&self, timeout: Duration) -> bool { self.shared.finished.wait(timeout) }

    pub fn monitors(&self) -> Vec<MonitorStatus> { self.shared.monitors() }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.shared.started.load(Ordering::Acquire) {
            self.shared.shutdown(Trigger::Exit);
        }
    }
}

/// Cloneable way for other threads (signal listener, status surface) to
/// observe the supervisor and request shutdown. Holds no ownership: once the
/// supervisor is gone every request is a no-op.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    shared: Weak<Shared>,
}

impl ShutdownHandle {
    /// Request shutdown. Safe from any thread, any number of times; only the
    /// first call has an effect and returns `true`.
    pub fn shutdown(&self, trigger: Trigger) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.shutdown(trigger),
            None => false,
        }
    }

    /// The status surface's quit action.
    pub fn quit(&self) -> bool { self.shutdown(Trigger::UserQuit) }

    pub fn state(&self) -> State { self.shared.upgrade().map_or(State::Stopped, |shared| shared.state()) }

    pub fn monitors(&self) -> Vec<MonitorStatus> {
        self.shared.upgrade().map(|shared| shared.monitors()).unwrap_or_default()
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("state", &self.state())
            .field("trigger", &self.trigger.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        fs,
        sync::atomic::AtomicUsize,
        thread,
        time::Instant,
    };

    const TICK: Duration = Duration::from_millis(10);

    fn healthy() -> Result<bool> { Ok(true) }

    fn down() -> Result<bool> { Ok(false) }

    fn fast() -> Options {
        Options {
            sentinel: None,
            sentinel_interval: TICK,
            join_timeout: Duration::from_secs(5),
        }
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn status<'a>(statuses: &'a [MonitorStatus], name: &str) -> &'a MonitorStatus {
        statuses.iter().find(|status| status.name == name).unwrap()
    }

    #[derive(Default)]
    struct CountingSurface {
        shown: AtomicUsize,
        hidden: AtomicUsize,
        quits: AtomicUsize,
    }

    impl StatusSurface for CountingSurface {
        fn show(&self) { self.shown.fetch_add(1, Ordering::SeqCst); }
        fn hide(&self) { self.hidden.fetch_add(1, Ordering::SeqCst); }
        fn notify_quit(&self) { self.quits.fetch_add(1, Ordering::SeqCst); }
    }

    #[test]
    fn test_register_rules() {
        let mut supervisor = Supervisor::new(fast());

        supervisor.register(Target::new("Battle.net", healthy, healthy, TICK)).unwrap();
        assert!(supervisor.register(Target::new("Battle.net", healthy, healthy, TICK)).is_err());

        supervisor.start().unwrap();
        let err = supervisor.register(Target::new("ROS-BOT", healthy, healthy, TICK)).unwrap_err();
        assert!(err.to_string().contains("after the supervisor has started"));

        supervisor.stop(Trigger::UserQuit);
    }

    #[test]
    fn test_lifecycle_states() {
        let mut supervisor = Supervisor::new(fast());
        supervisor.register(Target::new("game", healthy, healthy, TICK)).unwrap();
        assert_eq!(supervisor.state(), State::Idle);

        supervisor.start().unwrap();
        supervisor.start().unwrap();
        assert_eq!(supervisor.state(), State::Running);
        assert_eq!(supervisor.monitors().len(), 1);

        assert!(supervisor.stop(Trigger::UserQuit));
        assert_eq!(supervisor.state(), State::Stopped);
        assert_eq!(supervisor.trigger(), Some(Trigger::UserQuit));
        assert_eq!(status(&supervisor.monitors(), "game").state, State::Stopped);

        assert!(supervisor.start().is_err());
    }

    #[test]
    fn test_concurrent_stop_has_one_effect() {
        let surface = Arc::new(CountingSurface::default());
        let mut supervisor = Supervisor::new(fast());
        supervisor.set_surface(surface.clone()).unwrap();
        supervisor.register(Target::new("game", healthy, healthy, TICK)).unwrap();
        supervisor.start().unwrap();

        let handle = supervisor.handle();
        let callers: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                thread::spawn(move || handle.quit())
            })
            .collect();

        let winners = callers.into_iter().map(|caller| caller.join().unwrap()).filter(|won| *won).count();
        assert_eq!(winners, 1);

        assert!(supervisor.wait(Duration::from_secs(5)));
        assert!(!supervisor.stop(Trigger::Fatal));
        assert_eq!(supervisor.trigger(), Some(Trigger::UserQuit));

        drop(supervisor);
        assert_eq!(surface.shown.load(Ordering::SeqCst), 1);
        assert_eq!(surface.quits.load(Ordering::SeqCst), 1);
        assert_eq!(surface.hidden.load(Ordering::SeqCst), 1);
        assert!(!handle.quit());
    }

    #[test]
    fn test_failing_and_healthy_targets_run_independently() {
        let mut supervisor = Supervisor::new(fast());
        supervisor.register(Target::new("A", down, down, TICK)).unwrap();
        let never = || -> Result<bool> { panic!("B never needs recovery") };
        supervisor.register(Target::new("B", healthy, never, TICK)).unwrap();
        supervisor.start().unwrap();

        wait_for(|| status(&supervisor.monitors(), "A").stats.cycles >= 3);

        let started = Instant::now();
        supervisor.stop(Trigger::UserQuit);
        assert!(started.elapsed() < Duration::from_secs(5));

        let statuses = supervisor.monitors();
        let (a, b) = (status(&statuses, "A"), status(&statuses, "B"));
        assert!(a.stats.recoveries >= 3);
        assert_eq!(a.stats.recoveries, a.stats.cycles);
        assert_eq!(a.stats.failed, a.stats.recoveries);
        assert_eq!(b.stats.recoveries, 0);
        assert!(statuses.iter().all(|status| status.state == State::Stopped));
    }

    #[test]
    fn test_crashing_monitor_does_not_affect_siblings() {
        let mut supervisor = Supervisor::new(fast());
        let crash = || -> Result<bool> { panic!("enumeration blew up") };
        supervisor.register(Target::new("crashy", crash, down, TICK)).unwrap();
        supervisor.register(Target::new("steady", healthy, healthy, TICK)).unwrap();
        supervisor.start().unwrap();

        wait_for(|| status(&supervisor.monitors(), "steady").stats.cycles >= 5);
        assert_eq!(supervisor.state(), State::Running);

        let crashy = status(&supervisor.monitors(), "crashy").clone();
        assert_eq!(crashy.state, State::Running);
        assert!(crashy.stats.check_errors >= 1);

        supervisor.stop(Trigger::UserQuit);
    }

    #[test]
    fn test_shutdown_latency_bounded_by_wait_slice() {
        let mut supervisor = Supervisor::new(fast());
        supervisor.register(Target::new("slow", healthy, healthy, Duration::from_secs(60))).unwrap();
        supervisor.start().unwrap();
        wait_for(|| status(&supervisor.monitors(), "slow").stats.cycles >= 1);

        let started = Instant::now();
        supervisor.stop(Trigger::Interrupt);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(status(&supervisor.monitors(), "slow").stats.cycles, 1);
    }

    #[test]
    fn test_hung_recovery_is_abandoned() {
        let mut options = fast();
        options.join_timeout = Duration::from_millis(50);

        let hang = || -> Result<bool> {
            thread::sleep(Duration::from_secs(2));
            Ok(true)
        };

        let mut supervisor = Supervisor::new(options);
        supervisor.register(Target::new("stuck", down, hang, TICK)).unwrap();
        supervisor.start().unwrap();
        wait_for(|| status(&supervisor.monitors(), "stuck").stats.recoveries >= 1);

        let started = Instant::now();
        assert!(supervisor.stop(Trigger::Fatal));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(supervisor.state(), State::Stopped);
    }

    #[test]
    fn test_sentinel_file_stops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("stop_service.txt");
        let surface = Arc::new(CountingSurface::default());

        let mut supervisor = Supervisor::new(Options {
            sentinel: Some(marker.clone()),
            sentinel_interval: Duration::from_millis(20),
            join_timeout: Duration::from_secs(5),
        });
        supervisor.set_surface(surface.clone()).unwrap();
        supervisor.register(Target::new("Diablo III", healthy, healthy, Duration::from_secs(30))).unwrap();
        supervisor.register(Target::new("Battle.net", healthy, healthy, Duration::from_secs(30))).unwrap();
        supervisor.start().unwrap();

        fs::write(&marker, "stop").unwrap();

        assert!(supervisor.wait(Duration::from_secs(5)));
        assert_eq!(supervisor.state(), State::Stopped);
        assert_eq!(supervisor.trigger(), Some(Trigger::Sentinel));
        assert!(supervisor.monitors().iter().all(|status| status.state == State::Stopped));
        assert!(!marker.exists());
        assert_eq!(surface.quits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_undeletable_marker_stops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("stop_service.txt");
        fs::create_dir(&marker).unwrap();

        let mut supervisor = Supervisor::new(Options {
            sentinel: Some(marker.clone()),
            sentinel_interval: Duration::from_millis(20),
            join_timeout: Duration::from_secs(5),
        });
        supervisor.register(Target::new("ROS-BOT", healthy, healthy, Duration::from_secs(30))).unwrap();
        supervisor.start().unwrap();

        assert!(supervisor.wait(Duration::from_secs(5)));
        assert_eq!(supervisor.trigger(), Some(Trigger::Sentinel));
        assert_eq!(status(&supervisor.monitors(), "ROS-BOT").state, State::Stopped);
        assert!(marker.is_dir());
    }

    #[test]
    fn test_shutdown_during_start_leaves_nothing_running() {
        for _ in 0..50 {
            let mut supervisor = Supervisor::new(fast());
            supervisor.register(Target::new("Battle.net", healthy, healthy, TICK)).unwrap();
            supervisor.register(Target::new("Diablo III", down, healthy, TICK)).unwrap();

            let handle = supervisor.handle();
            let interrupt = thread::spawn(move || handle.shutdown(Trigger::Interrupt));

            let started = supervisor.start();
            assert!(interrupt.join().unwrap());
            assert!(supervisor.wait(Duration::from_secs(5)));

            let monitors = supervisor.monitors();
            match started {
                Ok(()) => assert_eq!(monitors.len(), 2),
                Err(_) => assert!(monitors.is_empty()),
            }
            assert!(monitors.iter().all(|status| status.state == State::Stopped));
        }
    }

    #[test]
    fn test_drop_shuts_down() {
        let surface = Arc::new(CountingSurface::default());
        let mut supervisor = Supervisor::new(fast());
        supervisor.set_surface(surface.clone()).unwrap();
        supervisor.register(Target::new("game", healthy, healthy, Duration::from_secs(30))).unwrap();
        supervisor.start().unwrap();

        let handle = supervisor.handle();
        assert_eq!(handle.state(), State::Running);

        drop(supervisor);
        assert_eq!(surface.quits.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), State::Stopped);
        assert!(handle.monitors().is_empty());
    }

    #[test]
    fn test_unstarted_drop_is_silent() {
        let surface = Arc::new(CountingSurface::default());
        let mut supervisor = Supervisor::new(fast());
        supervisor.set_surface(surface.clone()).unwrap();
        drop(supervisor);

        assert_eq!(surface.quits.load(Ordering::SeqCst), 0);
    }
}
