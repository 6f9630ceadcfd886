use super::{signal::CancellationSignal, target::Target, worker::Worker};

use anyhow::{Result, anyhow};
use std::{
    any::Any,
    fmt, panic,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            State::Idle => "idle",
            State::Running => "running",
            State::Stopping => "stopping",
            State::Stopped => "stopped",
        };
        f.write_str(state)
    }
}

/// Counters for one monitor, readable while it runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Completed or in-flight poll cycles.
    pub cycles: u64,
    /// Cycles in which the check raised instead of answering.
    pub check_errors: u64,
    /// Recovery attempts, at most one per cycle.
    pub recoveries: u64,
    pub recovered: u64,
    pub failed: u64,
    /// Failed recoveries since the last successful one.
    pub consecutive_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU64,
    check_errors: AtomicU64,
    recoveries: AtomicU64,
    recovered: AtomicU64,
    failed: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) -> u64 { counter.fetch_add(1, Ordering::Relaxed) + 1 }

    fn snapshot(&self) -> Stats {
        Stats {
            cycles: self.cycles.load(Ordering::Relaxed),
            check_errors: self.check_errors.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct Status {
    state: Mutex<State>,
    counters: Counters,
}

impl Status {
    fn state(&self) -> State { *self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    fn set_state(&self, state: State) { *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state; }
}

/// Read-only view of a monitor that outlives it being moved or stopped.
#[derive(Clone, Debug)]
pub struct Probe {
    name: String,
    status: Arc<Status>,
}

impl Probe {
    pub fn name(&self) -> &str { &self.name }

    pub fn state(&self) -> State { self.status.state() }

    pub fn stats(&self) -> Stats { self.status.counters.snapshot() }
}

/// Runs the check / recover / wait loop for a single target on its own thread.
///
/// The cancellation signal is shared with every sibling monitor: stopping one
/// monitor asks all of them to stop.
#[derive(Debug)]
pub struct Monitor {
    target: Arc<Target>,
    signal: Arc<CancellationSignal>,
    status: Arc<Status>,
    worker: Option<Worker>,
}

impl Monitor {
    pub fn new(target: Target, signal: Arc<CancellationSignal>) -> Self {
        Self {
            target: Arc::new(target),
            signal,
            status: Arc::new(Status {
                state: Mutex::new(State::Idle),
                counters: Counters::default(),
            }),
            worker: None,
        }
    }

    pub fn name(&self) -> &str { self.target.name() }

    pub fn state(&self) -> State { self.status.state() }

    pub fn stats(&self) -> Stats { self.status.counters.snapshot() }

    pub fn probe(&self) -> Probe {
        Probe {
            name: self.target.name().to_string(),
            status: Arc::clone(&self.status),
        }
    }

    /// Spawn the loop thread. Does nothing unless the monitor is idle.
    pub fn start(&mut self) -> Result<()> {
        if self.state() != State::Idle {
            return Ok(());
        }

        let target = Arc::clone(&self.target);
        let signal = Arc::clone(&self.signal);
        let status = Arc::clone(&self.status);

        let name = format!("{}-monitor", target.name());
        let worker = Worker::spawn(name, move || run(&target, &signal, &status.counters))
            .map_err(|err| anyhow!("unable to spawn monitor thread for {}: {err}", self.target.name()))?;

        self.worker = Some(worker);
        self.status.set_state(State::Running);
        log::info!("[monitor] {} started (interval={:?})", self.name(), self.target.poll_interval());

        Ok(())
    }

    /// Set the shared signal and join the loop thread for at most `timeout`.
    ///
    /// A thread still busy inside a check or recovery after the deadline is
    /// detached, not killed. Returns `false` only in that case.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        let Some(worker) = self.worker.take() else {
            return true;
        };

        self.status.set_state(State::Stopping);
        self.signal.set();

        let joined = worker.join(timeout);
        self.status.set_state(State::Stopped);

        match joined {
            true => log::info!("[monitor] {} stopped", self.name()),
            false => log::warn!(
                "[monitor] {} did not stop within {timeout:?}, abandoning its thread",
                self.name()
            ),
        }

        joined
    }
}

fn run(target: &Target, signal: &CancellationSignal, counters: &Counters) {
    let name = target.name();

    while !signal.is_set() {
        Counters::bump(&counters.cycles);

        let healthy = match contain(|| target.check()) {
            Ok(healthy) => healthy,
            Err(err) => {
                Counters::bump(&counters.check_errors);
                log::warn!("[monitor] {name} status check failed: {err:#}");
                false
            }
        };

        if !healthy {
            log::warn!("[monitor] {name} is not running, attempting recovery");
            recover(target, counters);
        }

        if signal.wait(target.poll_interval()) {
            break;
        }
    }
}

fn recover(target: &Target, counters: &Counters) {
    let name = target.name();
    Counters::bump(&counters.recoveries);

    let failure = match contain(|| target.recover()) {
        Ok(true) => {
            Counters::bump(&counters.recovered);
            counters.consecutive_failures.store(0, Ordering::Relaxed);
            log::info!("[monitor] {name} recovered");
            return;
        }
        Ok(false) => String::from("recovery reported failure"),
        Err(err) => format!("recovery errored: {err:#}"),
    };

    Counters::bump(&counters.failed);
    let streak = Counters::bump(&counters.consecutive_failures);
    log::error!("[monitor] {name} {failure} (consecutive failures: {streak})");
}

/// Run `call`, folding a panic into an ordinary error that carries the
/// panic message.
pub fn contain<T>(call: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(panic::AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(anyhow!("panicked: {}", panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    match payload.downcast_ref::<&str>() {
        Some(message) => *message,
        None => payload.downcast_ref::<String>().map(String::as_str).unwrap_or("unknown panic"),
    }
}
