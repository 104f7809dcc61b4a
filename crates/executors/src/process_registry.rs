use std::collections::HashMap;
use std::sync::Mutex;

/// Process-wide map of `task_id -> pid` for running agent subprocesses, so an
/// external cancel request (e.g. from an HTTP handler on another thread) can
/// terminate a task's process without ever needing to touch the handle the
/// streaming loop itself owns.
#[derive(Default)]
pub struct ProcessRegistry {
    pids: Mutex<HashMap<String, u32>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task_id: &str, pid: u32) {
        let mut pids = self.pids.lock().expect("process registry mutex poisoned");
        pids.insert(task_id.to_string(), pid);
    }

    pub fn unregister(&self, task_id: &str) {
        let mut pids = self.pids.lock().expect("process registry mutex poisoned");
        pids.remove(task_id);
    }

    /// Best-effort graceful terminate (SIGTERM on unix) of whatever process is
    /// currently registered for `task_id`. A no-op if nothing is registered:
    /// the task already finished, or never started.
    pub fn terminate(&self, task_id: &str) {
        let pid = {
            let pids = self.pids.lock().expect("process registry mutex poisoned");
            pids.get(task_id).copied()
        };
        if let Some(pid) = pid {
            terminate_pid(pid);
        }
    }
}

#[cfg(unix)]
fn terminate_pid(pid: u32) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    // Negative pid targets the whole process group: the agent subprocess
    // (`claude`) is spawned via command_group's group_spawn, which puts it in
    // its own group, so this reaches any children it has fanned out to.
    let _ = signal::killpg(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[cfg(not(unix))]
fn terminate_pid(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .status();
}
