//! Subprocess execution: foreground shell commands and supervised
//! background processes.

pub mod background;
pub mod shell;

pub use background::{AsyncProcessRegistry, ProcessHandle};
pub use shell::{CommandOutput, EXIT_NOT_FOUND, EXIT_TIMEOUT, run_command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Term,
    Kill,
}

/// Signal the process group led by `pid`. Returns false if delivery failed.
#[cfg(unix)]
pub(crate) fn kill_group(pid: u32, signal: Signal) -> bool {
    let sig = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // SAFETY: killpg has no memory-safety preconditions.
    let ret = unsafe { libc::killpg(pid as libc::pid_t, sig) };
    ret == 0
}

#[cfg(not(unix))]
pub(crate) fn kill_group(_pid: u32, _signal: Signal) -> bool {
    false
}
