pub mod structs;

use crate::{helpers, watchdog::Options};

use anyhow::{Context, Result, bail};
use colored::Colorize;
use macros_rs::{crashln, string};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use structs::prelude::*;

pub fn default_path() -> Result<PathBuf> {
    match home::home_dir() {
        Some(path) => Ok(path.join(".vigil").join("config.toml")),
        None => bail!("impossible to get your home directory"),
    }
}

/// Load the config for a binary, exiting on any failure.
///
/// Without an explicit path the default file is created on first use; an
/// explicit path has to exist.
pub fn read(path: Option<&Path>) -> Config {
    let loaded = match path {
        Some(path) => load(path),
        None => default_path().and_then(|path| {
            if create_default(&path)? {
                println!("{} Created config file {}", *helpers::SUCCESS, path.display());
            }
            load(&path)
        }),
    };

    match loaded {
        Ok(config) => config,
        Err(err) => crashln!(
            "{} Cannot load config.\n{}",
            *helpers::FAIL,
            string!(format!("{err:#}")).white()
        ),
    }
}

pub fn load(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path).with_context(|| format!("unable to read {}", path.display()))?;
    let config: Config = toml::from_str(&contents).with_context(|| format!("unable to parse {}", path.display()))?;

    config.validate().with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Write the default config to `path` unless a file is already there.
/// Returns whether it wrote one.
pub fn create_default(path: &Path) -> Result<bool> {
    if path.is_file() {
        return Ok(false);
    }

    Config::default().save(path)?;
    Ok(true)
}

impl Default for Config {
    fn default() -> Self {
        let battle_net = r"C:\Program Files (x86)\Battle.net\Battle.net.exe";

        Config {
            daemon: Daemon {
                interval: 10_000,
                sentinel_interval: 5_000,
                join_timeout: 5_000,
                sentinel: string!("stop_service.txt"),
                shell: string!("/bin/sh"),
                args: vec![string!("-c")],
                elevate: string!("sudo"),
            },
            log: Log {
                dir: string!("logs"),
                prefix: string!("vigil"),
                display_lines: 50,
                refresh: 30_000,
            },
            surface: Surface::default(),
            targets: vec![
                Target {
                    name: string!("Battle.net"),
                    process: string!("Battle.net.exe"),
                    interval: None,
                    launch: Launch {
                        program: string!(battle_net),
                        args: vec![],
                        elevated: false,
                        settle: 5_000,
                        after: vec![],
                        requires: None,
                    },
                },
                Target {
                    name: string!("Diablo III"),
                    process: string!("Diablo III64.exe"),
                    interval: None,
                    launch: Launch {
                        program: string!(battle_net),
                        args: vec![string!("--exec=launch D3")],
                        elevated: false,
                        settle: 5_000,
                        after: vec![],
                        requires: Some(string!("Battle.net")),
                    },
                },
                Target {
                    name: string!("ROS-BOT"),
                    process: string!("ROS-BOT.exe"),
                    interval: None,
                    launch: Launch {
                        program: string!("ROS-BOT.exe"),
                        args: vec![],
                        elevated: true,
                        settle: 15_000,
                        after: vec![],
                        requires: None,
                    },
                },
            ],
        }
    }
}

impl Config {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("unable to create {}", parent.display()))?;
        }

        let contents = toml::to_string(self).context("cannot encode config")?;
        fs::write(path, contents).with_context(|| format!("error writing {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let timings = [
            ("daemon.interval", self.daemon.interval),
            ("daemon.sentinel_interval", self.daemon.sentinel_interval),
            ("daemon.join_timeout", self.daemon.join_timeout),
            ("log.refresh", self.log.refresh),
        ];

        if let Some((key, _)) = timings.iter().find(|(_, value)| *value == 0) {
            bail!("{key} must be greater than zero");
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                bail!("every target needs a name");
            }
            if !names.insert(target.name.as_str()) {
                bail!("duplicate target name {}", target.name);
            }
            if target.process.trim().is_empty() {
                bail!("target {} has no process name", target.name);
            }
            if target.launch.program.trim().is_empty() {
                bail!("target {} has no launch program", target.name);
            }
            if target.interval == Some(0) {
                bail!("target {} interval must be greater than zero", target.name);
            }
        }

        for target in &self.targets {
            self.requirements(target)?;
        }

        Ok(())
    }

    /// Dependency chain of `target`, nearest first.
    pub fn requirements<'a>(&'a self, target: &'a Target) -> Result<Vec<&'a Target>> {
        let mut chain: Vec<&Target> = Vec::new();
        let mut current = target;

        while let Some(required) = current.launch.requires.as_deref() {
            let Some(next) = self.target(required) else {
                bail!("target {} requires unknown target {required}", current.name);
            };

            if next.name == target.name || chain.iter().any(|seen| seen.name == next.name) {
                bail!("target {} has a circular requirement through {}", target.name, next.name);
            }

            chain.push(next);
            current = next;
        }

        Ok(chain)
    }

    pub fn target(&self, name: &str) -> Option<&Target> { self.targets.iter().find(|target| target.name == name) }

    pub fn options(&self) -> Options {
        Options {
            sentinel: Some(PathBuf::from(&self.daemon.sentinel)),
            sentinel_interval: Duration::from_millis(self.daemon.sentinel_interval),
            join_timeout: Duration::from_millis(self.daemon.join_timeout),
        }
    }

    pub fn interval(&self, target: &Target) -> Duration {
        Duration::from_millis(target.interval.unwrap_or(self.daemon.interval))
    }

    pub fn log_file(&self) -> PathBuf { Path::new(&self.log.dir).join(format!("{}.log", self.log.prefix)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str, requires: Option<&str>) -> Target {
        Target {
            name: name.to_string(),
            process: format!("{name}.exe"),
            interval: None,
            launch: Launch {
                program: format!("/opt/{name}"),
                args: vec![],
                elevated: false,
                settle: 0,
                after: vec![],
                requires: requires.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();

        let diablo = config.target("Diablo III").unwrap();
        let chain = config.requirements(diablo).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name, "Battle.net");

        assert_eq!(config.interval(diablo), Duration::from_secs(10));
        assert_eq!(config.options().sentinel_interval, Duration::from_secs(5));
        assert_eq!(config.log_file(), Path::new("logs").join("vigil.log"));
    }

    #[test]
    fn test_create_default_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(create_default(&path).unwrap());
        assert!(path.is_file());
        assert_eq!(load(&path).unwrap(), Config::default());

        // an existing file is never overwritten
        fs::write(&path, "edited").unwrap();
        assert!(!create_default(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "edited");
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("absent.toml")).unwrap_err();

        assert!(format!("{err:#}").contains("unable to read"));
    }

    #[test]
    fn test_load_minimal_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[daemon]
interval = 2000
sentinel_interval = 1000
join_timeout = 3000
sentinel = "/tmp/vigil.stop"
shell = "/bin/bash"
args = ["-c"]
elevate = "pkexec"

[log]
dir = "/var/log/vigil"
prefix = "keepalive"
display_lines = 20
refresh = 5000

[[target]]
name = "bot"
process = "bot"
interval = 500

[target.launch]
program = "/opt/bot/bot"
after = ["clicker ok.png", { run = "clicker play.png", required = true }]
"#,
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert!(config.surface.enabled);

        let bot = config.target("bot").unwrap();
        assert_eq!(config.interval(bot), Duration::from_millis(500));
        assert_eq!(bot.launch.after.len(), 2);
        assert_eq!(bot.launch.after[0], Hook::Optional(String::from("clicker ok.png")));
        assert!(!bot.launch.after[0].required());
        assert_eq!(bot.launch.after[1].command(), "clicker play.png");
        assert!(bot.launch.after[1].required());
        assert!(!bot.launch.elevated);
        assert_eq!(bot.launch.requires, None);
        assert_eq!(config.log_file(), Path::new("/var/log/vigil").join("keepalive.log"));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut config = Config::default();
        config.targets = vec![target("game", None), target("game", None)];

        assert!(config.validate().unwrap_err().to_string().contains("duplicate target name game"));
    }

    #[test]
    fn test_validate_rejects_unknown_requirement() {
        let mut config = Config::default();
        config.targets = vec![target("game", Some("launcher"))];

        assert!(config.validate().unwrap_err().to_string().contains("unknown target launcher"));
    }

    #[test]
    fn test_validate_rejects_cycles() {
        let mut config = Config::default();
        config.targets = vec![target("a", Some("b")), target("b", Some("c")), target("c", Some("a"))];
        assert!(config.validate().unwrap_err().to_string().contains("circular"));

        config.targets = vec![target("self", Some("self"))];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timings() {
        let mut config = Config::default();
        config.daemon.interval = 0;
        assert!(config.validate().unwrap_err().to_string().contains("daemon.interval"));

        let mut config = Config::default();
        config.targets[0].interval = Some(0);
        assert!(config.validate().is_err());
    }
}
