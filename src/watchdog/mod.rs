//! Keep-alive supervision: per-target monitor loops, a sentinel-file watcher
//! and a single idempotent shutdown path shared by every trigger.

mod monitor;
mod sentinel;
mod signal;
mod supervisor;
mod surface;
mod target;
mod worker;

pub use monitor::{Monitor, Probe, State, Stats, contain};
pub use sentinel::SentinelWatcher;
pub use signal::CancellationSignal;
pub use supervisor::{MonitorStatus, Options, ShutdownHandle, Supervisor, Trigger};
pub use surface::{NullSurface, StatusSurface};
pub use target::{HealthCheck, RecoveryAction, Target};

pub(crate) use worker::Worker;
