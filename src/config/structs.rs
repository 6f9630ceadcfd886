use serde::{Deserialize, Serialize};

pub mod prelude {
    pub use super::{Config, Daemon, Hook, Launch, Log, Surface, Target};
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    pub daemon: Daemon,
    pub log: Log,
    #[serde(default)]
    pub surface: Surface,
    #[serde(default, rename = "target")]
    pub targets: Vec<Target>,
}

/// Timings are in milliseconds, like the rest of the file.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Daemon {
    pub interval: u64,
    pub sentinel_interval: u64,
    pub join_timeout: u64,
    pub sentinel: String,
    pub shell: String,
    pub args: Vec<String>,
    pub elevate: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Log {
    pub dir: String,
    pub prefix: String,
    pub display_lines: usize,
    pub refresh: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Surface {
    pub enabled: bool,
}

impl Default for Surface {
    fn default() -> Self { Self { enabled: true } }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    /// Process name the presence check looks for.
    pub process: String,
    /// Overrides `daemon.interval` for this target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    pub launch: Launch,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Launch {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub elevated: bool,
    /// Wait after spawning before hooks run and presence is verified.
    #[serde(default)]
    pub settle: u64,
    /// Commands run through the shell once the program has settled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<Hook>,
    /// Target that must be running before this one is launched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,
}

/// A post-launch command. A plain string is optional; a failing
/// `required` step makes the launch report failure.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Hook {
    Optional(String),
    Step {
        run: String,
        #[serde(default)]
        required: bool,
    },
}

impl Hook {
    pub fn command(&self) -> &str {
        match self {
            Hook::Optional(run) | Hook::Step { run, .. } => run,
        }
    }

    pub fn required(&self) -> bool { matches!(self, Hook::Step { required: true, .. }) }
}
