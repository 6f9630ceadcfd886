/// One live process as seen by the enumeration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeProcess {
    pub pid: i64,
    /// Kernel short name; truncated to 15 bytes on Linux.
    pub comm: String,
    /// Basename of argv[0], when readable.
    pub exe_name: Option<String>,
}

/// Basename of a launch path, accepting both `/` and `\` separators so
/// programs started through a Windows compatibility layer still match.
pub fn exe_basename(path: &str) -> Option<&str> {
    path.rsplit(['/', '\\']).next().map(str::trim).filter(|name| !name.is_empty())
}

#[cfg(target_os = "linux")]
pub fn native_processes() -> Result<Vec<NativeProcess>, String> {
    use std::fs;

    let entries = fs::read_dir("/proc").map_err(|e| format!("Failed to read /proc: {}", e))?;
    let mut processes = Vec::new();

    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|name| name.parse::<i64>().ok()) else {
            continue;
        };

        // the process may have exited between readdir and here
        let Ok(comm) = get_process_name(pid as u32) else {
            continue;
        };

        if is_process_zombie(pid as i32) {
            continue;
        }

        processes.push(NativeProcess { pid, comm, exe_name: get_exe_name(pid as u32) });
    }

    Ok(processes)
}

#[cfg(not(target_os = "linux"))]
pub fn native_processes() -> Result<Vec<NativeProcess>, String> {
    let output = std::process::Command::new("ps")
        .args(["-A", "-o", "pid=,comm="])
        .output()
        .map_err(|e| format!("Failed to run ps: {}", e))?;

    if !output.status.success() {
        return Err(format!("ps exited with {}", output.status));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let processes = stdout
        .lines()
        .filter_map(|line| {
            let (pid, command) = line.trim().split_once(char::is_whitespace)?;
            let command = command.trim();
            Some(NativeProcess {
                pid: pid.parse().ok()?,
                comm: exe_basename(command).unwrap_or(command).to_string(),
                exe_name: exe_basename(command).map(str::to_string),
            })
        })
        .collect();

    Ok(processes)
}

#[cfg(target_os = "linux")]
pub fn get_process_name(pid: u32) -> Result<String, String> {
    use std::fs;

    let comm_path = format!("/proc/{}/comm", pid);
    fs::read_to_string(&comm_path)
        .map(|name| name.trim().to_string())
        .map_err(|e| format!("Failed to read process name: {}", e))
}

#[cfg(target_os = "linux")]
pub fn get_exe_name(pid: u32) -> Option<String> {
    let cmdline = std::fs::read(format!("/proc/{}/cmdline", pid)).ok()?;
    let argv0 = cmdline.split(|byte| *byte == 0).next()?;

    exe_basename(&String::from_utf8_lossy(argv0)).map(str::to_string)
}

/// A zombie has exited but not been reaped yet; it must not count as alive.
#[cfg(target_os = "linux")]
pub fn is_process_zombie(pid: i32) -> bool {
    use std::fs;

    let stat_path = format!("/proc/{}/stat", pid);
    let Ok(stat_content) = fs::read_to_string(&stat_path) else {
        return false;
    };

    // comm may contain spaces, so the state is the first field after the last ')'
    stat_content
        .rfind(')')
        .and_then(|paren_end| stat_content[paren_end + 1..].split_whitespace().next())
        .is_some_and(|state| state == "Z")
}
