use chrono::{DateTime, Utc};
use colored::Colorize;
use once_cell::sync::Lazy;

pub static SUCCESS: Lazy<colored::ColoredString> = Lazy::new(|| "[VIGIL]".green());
pub static FAIL: Lazy<colored::ColoredString> = Lazy::new(|| "[VIGIL]".red());
pub static WARN: Lazy<colored::ColoredString> = Lazy::new(|| "[VIGIL]".yellow());

/// Elapsed time since `datetime`, largest units first, e.g. `1d 2h 3m 4s`.
pub fn format_duration(datetime: DateTime<Utc>) -> String {
    let seconds = Utc::now().signed_duration_since(datetime).num_seconds().max(0);
    format_seconds(seconds)
}

pub fn format_seconds(seconds: i64) -> String {
    let units = [(seconds / 86400, "d"), (seconds % 86400 / 3600, "h"), (seconds % 3600 / 60, "m")];

    let mut parts: Vec<String> = units
        .iter()
        .skip_while(|(value, _)| *value == 0)
        .map(|(value, suffix)| format!("{value}{suffix}"))
        .collect();

    parts.push(format!("{}s", seconds % 60));
    parts.join(" ")
}
