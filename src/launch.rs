use crate::{
    config::structs::{Config, Daemon, Hook, Launch, Target},
    process,
    watchdog::RecoveryAction,
};

use anyhow::{Context, Result, anyhow};
use nix::unistd::Uid;
use std::{
    os::unix::process::CommandExt,
    process::{Command, Stdio},
    sync::Arc,
    thread,
    time::Duration,
};

/// Restarts a target program and reports whether its process came back.
#[derive(Debug)]
pub struct Launcher {
    name: String,
    process: String,
    launch: Launch,
    shell: String,
    shell_args: Vec<String>,
    elevate: String,
    requires: Option<Arc<Launcher>>,
}

impl Launcher {
    pub fn new(target: &Target, daemon: &Daemon) -> Self {
        Self {
            name: target.name.clone(),
            process: target.process.clone(),
            launch: target.launch.clone(),
            shell: daemon.shell.clone(),
            shell_args: daemon.args.clone(),
            elevate: daemon.elevate.clone(),
            requires: None,
        }
    }

    /// Build the launcher for `target` along with its whole requirement chain.
    pub fn from_config(config: &Config, target: &Target) -> Result<Self> {
        let chain = config.requirements(target)?;
        let mut launcher = Self::new(target, &config.daemon);

        if let Some(required) = chain.first() {
            launcher.requires = Some(Arc::new(Self::from_config(config, required)?));
        }

        Ok(launcher)
    }

    pub fn name(&self) -> &str { &self.name }

    fn command(&self) -> Command {
        let mut cmd = if self.launch.elevated && !Uid::effective().is_root() {
            let mut cmd = Command::new(&self.elevate);
            cmd.arg(&self.launch.program);
            cmd
        } else {
            Command::new(&self.launch.program)
        };

        cmd.args(&self.launch.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0);

        cmd
    }

    fn spawn(&self) -> Result<()> {
        let mut child = self
            .command()
            .spawn()
            .with_context(|| format!("failed to spawn {} ({})", self.name, self.launch.program))?;

        log::info!("[launch] spawned {} (pid {})", self.name, child.id());

        // reap the child whenever it exits; it is otherwise left to run on its own
        let reaper = thread::Builder::new().name(format!("{}-reaper", self.name));
        if let Err(err) = reaper.spawn(move || child.wait()) {
            log::warn!("[launch] unable to watch {} for exit: {err}", self.name);
        }

        Ok(())
    }

    fn run_hook(&self, hook: &Hook) -> bool {
        let command = hook.command();
        log::debug!("[launch] {} hook: {command}", self.name);

        let status = Command::new(&self.shell)
            .args(&self.shell_args)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => true,
            Ok(status) => {
                log::warn!("[launch] {} hook '{command}' exited with {status}", self.name);
                false
            }
            Err(err) => {
                log::warn!("[launch] {} hook '{command}' could not run: {err}", self.name);
                false
            }
        }
    }

    /// Run the `after` hooks in order. Stops at the first failed required one.
    fn run_hooks(&self) -> bool {
        for hook in &self.launch.after {
            if !self.run_hook(hook) && hook.required() {
                log::error!("[launch] {} required step '{}' failed", self.name, hook.command());
                return false;
            }
        }
        true
    }
}

impl RecoveryAction for Launcher {
    fn recover(&self) -> Result<bool> {
        if process::is_running(&self.process)? {
            log::debug!("[launch] {} is already running", self.name);
            return Ok(true);
        }

        if let Some(required) = &self.requires {
            match required.recover() {
                Ok(true) => {}
                Ok(false) => {
                    log::warn!("[launch] {} not started, {} is not running", self.name, required.name());
                    return Ok(false);
                }
                Err(err) => {
                    log::warn!("[launch] {} not started, {} failed: {err:#}", self.name, required.name());
                    return Ok(false);
                }
            }
        }

        log::info!("[launch] starting {}", self.name);
        self.spawn()?;

        thread::sleep(Duration::from_millis(self.launch.settle));
        if !self.run_hooks() {
            return Ok(false);
        }

        process::is_running(&self.process).map_err(|err| anyhow!("unable to verify {}: {err}", self.name))
    }
}
