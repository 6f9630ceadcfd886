use anyhow::Result;
use std::{fmt, time::Duration};

/// Answers "is the target alive right now?".
///
/// Must return quickly. Ordinary absence is `Ok(false)`; `Err` is reserved for
/// a collaborator that could not determine the status at all, and the monitor
/// treats it as down.
pub trait HealthCheck: Send + Sync {
    fn check(&self) -> Result<bool>;
}

/// Attempts to bring a target back up, reporting whether it believes it worked.
///
/// May be slow and may run several sequenced steps. Called at most once per
/// poll cycle.
pub trait RecoveryAction: Send + Sync {
    fn recover(&self) -> Result<bool>;
}

impl<F> HealthCheck for F
where
    F: Fn() -> Result<bool> + Send + Sync,
{
    fn check(&self) -> Result<bool> { self() }
}

impl<F> RecoveryAction for F
where
    F: Fn() -> Result<bool> + Send + Sync,
{
    fn recover(&self) -> Result<bool> { self() }
}

/// A named process kept alive by one monitor. Immutable once built.
pub struct Target {
    name: String,
    check: Box<dyn HealthCheck>,
    recover: Box<dyn RecoveryAction>,
    poll_interval: Duration,
}

impl Target {
    pub fn new<C, R>(name: impl Into<String>, check: C, recover: R, poll_interval: Duration) -> Self
    where
        C: HealthCheck + 'static,
        R: RecoveryAction + 'static,
    {
        Self {
            name: name.into(),
            check: Box::new(check),
            recover: Box::new(recover),
            poll_interval,
        }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn poll_interval(&self) -> Duration { self.poll_interval }

    pub(crate) fn check(&self) -> Result<bool> { self.check.check() }

    pub(crate) fn recover(&self) -> Result<bool> { self.recover.recover() }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
