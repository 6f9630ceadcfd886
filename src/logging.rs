use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::{Level, LevelFilter};
use std::{
    fmt,
    fs::{self, File},
    io::{self, Write},
    path::Path,
};

const TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

/// Copies every record to the log file and, when echoing, to stdout.
struct Tee {
    file: File,
    echo: bool,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        if self.echo {
            io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.echo {
            io::stdout().flush()?;
        }
        Ok(())
    }
}

fn line(time: DateTime<Local>, level: Level, message: impl fmt::Display) -> String {
    format!("{} - {level} - {message}", time.format(TIMESTAMP))
}

/// Install the global logger, truncating the file at `path` for this run.
pub fn init(path: &Path, level: LevelFilter, echo: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("unable to create log directory {}", parent.display()))?;
    }

    let file = File::create(path).with_context(|| format!("unable to open log file {}", path.display()))?;

    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "{}", line(Local::now(), record.level(), record.args())))
        .target(env_logger::Target::Pipe(Box::new(Tee { file, echo })))
        .try_init()
        .context("logger already initialised")
}

/// The last `lines` lines of the log at `path`.
pub fn tail(path: &Path, lines: usize) -> Result<Vec<String>> {
    let bytes = fs::read(path).with_context(|| format!("unable to read {}", path.display()))?;
    let contents = String::from_utf8_lossy(&bytes);
    let all: Vec<&str> = contents.lines().collect();

    Ok(all[all.len().saturating_sub(lines)..].iter().map(|line| line.to_string()).collect())
}
