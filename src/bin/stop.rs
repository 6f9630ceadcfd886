use clap::Parser;
use colored::Colorize;
use macros_rs::{crashln, string};
use std::{fs, path::PathBuf};
use vigil::{config, helpers};

#[derive(Parser)]
#[command(version, about = "Asks a running vigil to shut down")]
struct Cli {
    /// Config file to read the sentinel path from
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Sentinel file to write, overrides the config
    #[arg(short, long)]
    path: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    let path = match cli.path {
        Some(path) => path,
        None => PathBuf::from(config::read(cli.config.as_deref()).daemon.sentinel),
    };

    match fs::write(&path, "stop") {
        Ok(()) => println!(
            "{} Wrote {}, vigil will stop within the next watcher poll",
            *helpers::SUCCESS,
            path.display().to_string().bold()
        ),
        Err(err) => crashln!(
            "{} Failed to write {}.\n{}",
            *helpers::FAIL,
            path.display(),
            string!(err.to_string()).white()
        ),
    }
}
