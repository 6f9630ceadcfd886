use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use colored::Colorize;
use macros_rs::{crashln, string};
use std::{path::PathBuf, sync::Arc, time::Duration};

use vigil::{
    config::{self, structs::Config},
    console::ConsoleSurface,
    helpers,
    launch::Launcher,
    logging,
    process::Presence,
    signals,
    watchdog::{self, Supervisor, Target, Trigger},
};

#[derive(Parser)]
#[command(version, about = "Keeps a set of programs running until told to stop")]
struct Cli {
    /// Config file, defaults to ~/.vigil/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Run without the console status screen
    #[arg(long)]
    headless: bool,
    #[clap(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn build(config: &Config, headless: bool) -> anyhow::Result<Supervisor> {
    let mut supervisor = Supervisor::new(config.options());

    for target in &config.targets {
        let launcher = Launcher::from_config(config, target)?;
        let check = Presence::new(&target.process);
        supervisor.register(Target::new(&target.name, check, launcher, config.interval(target)))?;
    }

    if !headless {
        let refresh = Duration::from_millis(config.log.refresh);
        let lines = config.log.display_lines;
        let surface = ConsoleSurface::new(supervisor.handle(), config.log_file(), lines, refresh);
        supervisor.set_surface(Arc::new(surface))?;
    }

    Ok(supervisor)
}

/// Block until shutdown completes. An error or panic escaping here is
/// logged with its message and stops the supervisor with `Trigger::Fatal`.
fn watch(supervisor: &mut Supervisor) {
    let watched = watchdog::contain(|| {
        supervisor.start()?;
        while !supervisor.wait(Duration::from_secs(1)) {}
        Ok(())
    });

    if let Err(err) = watched {
        log::error!("[vigil] fatal: {err:#}");
        supervisor.stop(Trigger::Fatal);
    }
}

fn main() {
    let cli = Cli::parse();
    let config = config::read(cli.config.as_deref());
    let headless = cli.headless || !config.surface.enabled;

    if let Err(err) = logging::init(&config.log_file(), cli.verbose.log_level_filter(), headless) {
        crashln!(
            "{} Failed to start logging.\n{}",
            *helpers::FAIL,
            string!(format!("{err:#}")).white()
        );
    }

    let mut supervisor = match build(&config, headless) {
        Ok(supervisor) => supervisor,
        Err(err) => crashln!(
            "{} Failed to set up monitors.\n{}",
            *helpers::FAIL,
            string!(format!("{err:#}")).white()
        ),
    };

    if let Err(err) = signals::listen(supervisor.handle()) {
        log::warn!("[vigil] termination signals will not be handled: {err}");
    }

    log::info!("[vigil] watching {} targets, create {} to stop", config.targets.len(), config.daemon.sentinel);
    watch(&mut supervisor);

    match supervisor.trigger() {
        Some(trigger) => log::info!("[vigil] stopped by {trigger}"),
        None => log::info!("[vigil] stopped"),
    }
}
