/// Reliability Guard
///
/// **WARNING: this is NOT a security sandbox.** It is a best-effort
/// mitigation that keeps well-meaning but buggy candidate code from damaging
/// the host (fork bombs, deleting files, killing other processes). Code that
/// actively tries to escape will succeed. Run untrusted code inside a real
/// isolation boundary.
///
/// **Two layers:**
/// - Process level, applied in `pre_exec` before the interpreter starts: a
///   new session (so timeouts can kill the whole process group) and
///   `RLIMIT_AS` / `RLIMIT_DATA` / `RLIMIT_STACK` caps.
/// - Interpreter level, `python/guard.py`: executed by the driver once,
///   immediately before the first candidate call. Destructive `os`,
///   `shutil` and `subprocess` entry points are replaced with `None` and a
///   few modules are poisoned in `sys.modules`.
///
/// Both layers are one-way for the lifetime of the process. Nothing restores
/// them; a fresh driver process is the only way back.
use tokio::process::Command;
use tracing::debug;

const GUARD_PRELUDE: &str = include_str!("python/guard.py");
const DRIVER_BODY: &str = include_str!("python/driver.py");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReliabilityGuard {
    /// Address-space / data / stack cap for the driver; 0 disables the rlimits
    memory_limit_bytes: u64,
}

impl ReliabilityGuard {
    pub fn new(memory_limit_bytes: u64) -> Self {
        Self { memory_limit_bytes }
    }

    /// Full driver program: the guard prelude followed by the driver loop
    pub fn driver_script() -> String {
        format!("{}\n\n{}", GUARD_PRELUDE, DRIVER_BODY)
    }

    /// Start the child in its own session and cap its memory
    pub fn confine(&self, command: &mut Command) {
        let limit = self.memory_limit_bytes;
        debug!(memory_limit_bytes = limit, "applying process limits");

        // SAFETY: the closure runs between fork and exec and only calls
        // async-signal-safe libc functions.
        unsafe {
            command.pre_exec(move || {
                start_session()?;
                if limit > 0 {
                    apply_memory_limits(limit);
                }
                Ok(())
            });
        }
    }

    /// Start the child in its own session without touching its limits
    pub fn detach(command: &mut Command) {
        // SAFETY: see `confine`
        unsafe {
            command.pre_exec(start_session);
        }
    }
}

fn start_session() -> std::io::Result<()> {
    if unsafe { libc::setsid() } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Lowering a soft limit can still fail when the hard limit is already
/// smaller; such failures are ignored and the inherited limit stays.
fn apply_memory_limits(bytes: u64) {
    let limit = libc::rlimit {
        rlim_cur: bytes as libc::rlim_t,
        rlim_max: bytes as libc::rlim_t,
    };
    unsafe {
        libc::setrlimit(libc::RLIMIT_AS, &limit);
        libc::setrlimit(libc::RLIMIT_DATA, &limit);
        #[cfg(not(target_os = "macos"))]
        libc::setrlimit(libc::RLIMIT_STACK, &limit);
    }
}

/// SIGKILL every process in the group led by `pid`
pub fn kill_process_group(pid: u32) {
    let result = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if result == -1 {
        // ESRCH: the group already exited
        debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}
