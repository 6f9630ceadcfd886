use crate::{
    helpers, logging,
    watchdog::{CancellationSignal, MonitorStatus, ShutdownHandle, State, StatusSurface, Worker},
};

use chrono::{DateTime, Utc};
use colored::Colorize;
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::Duration,
};
use tabled::{Table, Tabled, settings::Style};

const CLEAR: &str = "\x1B[2J\x1B[H";

#[derive(Tabled)]
struct MonitorItem {
    target: String,
    state: colored::ColoredString,
    checks: u64,
    #[tabled(rename = "restarts")]
    recoveries: u64,
    #[tabled(rename = "ok")]
    recovered: u64,
    failed: u64,
    #[tabled(rename = "streak")]
    consecutive: u64,
}

impl From<MonitorStatus> for MonitorItem {
    fn from(status: MonitorStatus) -> Self {
        let state = match status.state {
            State::Running => "running".green().bold(),
            State::Stopping => "stopping".yellow().bold(),
            State::Stopped => "stopped".red().bold(),
            State::Idle => "idle".white(),
        };

        Self {
            target: status.name,
            state,
            checks: status.stats.cycles,
            recoveries: status.stats.recoveries,
            recovered: status.stats.recovered,
            failed: status.stats.failed,
            consecutive: status.stats.consecutive_failures,
        }
    }
}

struct View {
    handle: ShutdownHandle,
    log: PathBuf,
    lines: usize,
    started: DateTime<Utc>,
}

impl View {
    fn render(&self) -> String {
        let mut out = format!(
            "{} watching, uptime {}  (type q + enter to quit)\n",
            *helpers::SUCCESS,
            helpers::format_duration(self.started)
        );

        let items: Vec<MonitorItem> = self.handle.monitors().into_iter().map(MonitorItem::from).collect();
        if items.is_empty() {
            out.push_str("no targets are being monitored\n");
        } else {
            out.push_str(&Table::new(items).with(Style::rounded().remove_horizontals()).to_string());
            out.push('\n');
        }

        out.push_str(&format!("\n{}\n", "recent log".bright_black()));
        match logging::tail(&self.log, self.lines) {
            Ok(lines) => lines.iter().for_each(|line| {
                out.push_str(line);
                out.push('\n');
            }),
            Err(err) => out.push_str(&format!("{} {err:#}\n", *helpers::WARN)),
        }

        out
    }

    fn draw(&self) {
        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, "{CLEAR}{}", self.render());
        let _ = stdout.flush();
    }
}

/// Terminal status screen: a periodically redrawn monitor table with the
/// tail of the log, and a `q` command on stdin that requests shutdown.
pub struct ConsoleSurface {
    view: Arc<View>,
    refresh: Duration,
    join_timeout: Duration,
    closing: Arc<CancellationSignal>,
    refresher: Mutex<Option<Worker>>,
}

impl ConsoleSurface {
    pub fn new(handle: ShutdownHandle, log: impl Into<PathBuf>, lines: usize, refresh: Duration) -> Self {
        Self {
            view: Arc::new(View {
                handle,
                log: log.into(),
                lines,
                started: Utc::now(),
            }),
            refresh,
            join_timeout: Duration::from_secs(1),
            closing: Arc::new(CancellationSignal::new()),
            refresher: Mutex::new(None),
        }
    }

    pub fn render(&self) -> String { self.view.render() }

    fn listen(handle: ShutdownHandle) {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };

            if matches!(line.trim().to_ascii_lowercase().as_str(), "q" | "quit" | "exit") {
                handle.quit();
                return;
            }
        }

        log::debug!("[console] stdin closed, quit command unavailable");
    }
}

impl StatusSurface for ConsoleSurface {
    fn show(&self) {
        let view = Arc::clone(&self.view);
        let closing = Arc::clone(&self.closing);
        let refresh = self.refresh;

        let refresher = Worker::spawn(String::from("console-refresh"), move || {
            loop {
                view.draw();
                if closing.wait(refresh) {
                    break;
                }
            }
        });

        match refresher {
            Ok(worker) => *self.refresher.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker),
            Err(err) => log::warn!("[console] unable to start refresh thread: {err}"),
        }

        // blocked on stdin until the process exits, never joined
        let handle = self.view.handle.clone();
        let input = thread::Builder::new()
            .name(String::from("console-input"))
            .spawn(move || Self::listen(handle));

        if let Err(err) = input {
            log::warn!("[console] unable to read commands from stdin: {err}");
        }
    }

    fn hide(&self) {
        self.closing.set();

        let refresher = self.refresher.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = refresher
            && !worker.join(self.join_timeout)
        {
            log::warn!("[console] refresh thread did not exit in time");
        }

        self.view.draw();
    }

    fn notify_quit(&self) {
        println!("{} shutting down, stopping all monitors", *helpers::WARN);
    }
}
