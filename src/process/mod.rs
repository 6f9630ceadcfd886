pub mod unix;

use crate::watchdog::HealthCheck;

use anyhow::{Result, anyhow};
use unix::NativeProcess;

/// Linux truncates `/proc/<pid>/comm` to this many bytes.
const COMM_LEN: usize = 15;

/// Whether `process` is the process called `name`, ignoring ASCII case.
///
/// Tries the executable basename first, then the kernel short name, which
/// only has to match the leading bytes when it was truncated.
pub fn matches(process: &NativeProcess, name: &str) -> bool {
    if process.exe_name.as_deref().is_some_and(|exe| exe.eq_ignore_ascii_case(name)) {
        return true;
    }

    let comm = process.comm.as_str();
    if comm.eq_ignore_ascii_case(name) {
        return true;
    }

    comm.len() == COMM_LEN
        && name.len() > COMM_LEN
        && name.get(..COMM_LEN).is_some_and(|prefix| prefix.eq_ignore_ascii_case(comm))
}

/// PIDs of every live process called `name`.
pub fn find(name: &str) -> Result<Vec<i64>> {
    let processes = unix::native_processes().map_err(|err| anyhow!("process enumeration failed: {err}"))?;
    Ok(processes.iter().filter(|process| matches(process, name)).map(|process| process.pid).collect())
}

/// Process presence oracle. Absence is `Ok(false)`; only a failed
/// enumeration is an error.
pub fn is_running(name: &str) -> Result<bool> { Ok(!find(name)?.is_empty()) }

/// Health check that a named process is present.
#[derive(Clone, Debug)]
pub struct Presence {
    process: String,
}

impl Presence {
    pub fn new(process: impl Into<String>) -> Self { Self { process: process.into() } }
}

impl HealthCheck for Presence {
    fn check(&self) -> Result<bool> { is_running(&self.process) }
}
