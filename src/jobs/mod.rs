//! Job control: signal handlers, the foreground-job cell, and background jobs.
//!
//! Two handlers live for the whole shell session:
//!
//! - **reaper** (`SIGCHLD`): collects every exited child without blocking, so
//!   background jobs never linger as zombies.
//! - **stop forwarder** (`SIGTSTP`): sends `SIGSTOP` to the current foreground
//!   job, which makes the launcher's wait return. The shell itself keeps running.
//!
//! The foreground job id is a single atomic. It is written by the launcher
//! and read by the forwarder. A stop racing with a job exit may target a
//! pid that just finished; that is accepted.

pub mod launcher;

pub use launcher::ProcessLauncher;

use std::io::Write;
use std::os::raw::c_int;
use std::sync::atomic::{AtomicI32, Ordering};

use log::{debug, info};
use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};

use crate::eval::{Evaluator, Launcher};
use crate::parse::Expression;

/// Pid of the job the shell is currently waiting on, or 0.
static FOREGROUND_JOB: AtomicI32 = AtomicI32::new(0);

/// Exit status of a background job whose tree evaluated to success / failure.
const BACKGROUND_SUCCESS: i32 = 0;
const BACKGROUND_FAILURE: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),
    #[error("cannot install {signal} handler: {source}")]
    Handler {
        signal: Signal,
        #[source]
        source: nix::Error,
    },
    #[error("cannot change signal mask: {0}")]
    Mask(#[source] nix::Error),
}

/// Install the reaper and the stop forwarder. Call once at startup.
pub fn install_handlers() -> Result<(), JobError> {
    let reaper = SigAction::new(
        SigHandler::Handler(reap_children),
        SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
        SigSet::empty(),
    );
    let forwarder = SigAction::new(
        SigHandler::Handler(forward_stop),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    for (signal, action) in [(Signal::SIGCHLD, &reaper), (Signal::SIGTSTP, &forwarder)] {
        // SAFETY: both handlers only call async-signal-safe functions
        // (waitpid, kill) and touch nothing but an atomic and errno.
        unsafe { signal::sigaction(signal, action) }
            .map_err(|source| JobError::Handler { signal, source })?;
    }
    debug!("job control handlers installed");
    Ok(())
}

extern "C" fn reap_children(_: c_int) {
    let saved = Errno::last_raw();
    loop {
        match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(_) => continue,
        }
    }
    Errno::set_raw(saved);
}

extern "C" fn forward_stop(_: c_int) {
    let saved = Errno::last_raw();
    if let Some(pid) = foreground_job() {
        let _ = signal::kill(pid, Signal::SIGSTOP);
    }
    Errno::set_raw(saved);
}

/// The job currently being waited on, if any.
pub fn foreground_job() -> Option<Pid> {
    match FOREGROUND_JOB.load(Ordering::SeqCst) {
        0 => None,
        pid => Some(Pid::from_raw(pid)),
    }
}

pub(crate) fn set_foreground(pid: Pid) {
    FOREGROUND_JOB.store(pid.as_raw(), Ordering::SeqCst);
}

pub(crate) fn clear_foreground() {
    FOREGROUND_JOB.store(0, Ordering::SeqCst);
}

/// Signal dispositions for every process the shell creates: terminal stops
/// are ignored (the shell forwards `SIGSTOP` instead) and `SIGCHLD` is back
/// to its default. Only async-signal-safe calls; errors are ignored.
pub(crate) fn reset_child_signals() {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    // SAFETY: installing SIG_IGN / SIG_DFL has no handler code to run.
    unsafe {
        let _ = signal::sigaction(Signal::SIGTSTP, &ignore);
        let _ = signal::sigaction(Signal::SIGCHLD, &default);
    }
}

/// Keeps `SIGCHLD` blocked on this thread until dropped.
///
/// While a foreground child is being waited on, the reaper must not run,
/// or it could collect that child before `waitpid` does. Notifications
/// that arrive meanwhile stay pending and are delivered on drop.
pub(crate) struct ChildSignalsBlocked {
    previous: SigSet,
}

impl ChildSignalsBlocked {
    pub(crate) fn new() -> Result<Self, JobError> {
        let mut mask = SigSet::empty();
        mask.add(Signal::SIGCHLD);
        let previous = mask
            .thread_swap_mask(SigmaskHow::SIG_BLOCK)
            .map_err(JobError::Mask)?;
        Ok(Self { previous })
    }

    /// Restore the inherited mask in a freshly forked child.
    pub(crate) fn restore_in_child(&self) {
        let _ = self.previous.thread_set_mask();
    }
}

impl Drop for ChildSignalsBlocked {
    fn drop(&mut self) {
        let _ = self.previous.thread_set_mask();
    }
}

/// Evaluate `expr` in a new process without waiting for it.
///
/// The child exits 0 if the tree succeeded and 1 otherwise. The reaper
/// collects it; the caller gets the pid back immediately.
pub fn run_background<L: Launcher>(expr: &Expression, launcher: L) -> Result<Pid, JobError> {
    let _ = std::io::stdout().flush();

    // SAFETY: the shell is single-threaded while it forks; the child only
    // evaluates the tree and leaves through `_exit`.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            reset_child_signals();
            let ok = Evaluator::new(launcher).eval(expr);
            let _ = std::io::stdout().flush();
            unsafe {
                nix::libc::_exit(if ok {
                    BACKGROUND_SUCCESS
                } else {
                    BACKGROUND_FAILURE
                })
            }
        }
        Ok(ForkResult::Parent { child }) => {
            info!("[{child}] started in background");
            Ok(child)
        }
        Err(e) => Err(JobError::Fork(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The reaper and the forwarder act on process-wide state shared with
    // concurrently running launcher tests, so they are exercised through
    // the binary in tests/integration.rs instead.

    #[test]
    fn blocked_guard_restores_mask() {
        let before = SigSet::thread_get_mask().unwrap();
        {
            let _guard = ChildSignalsBlocked::new().unwrap();
            let during = SigSet::thread_get_mask().unwrap();
            assert!(during.contains(Signal::SIGCHLD));
        }
        let after = SigSet::thread_get_mask().unwrap();
        assert_eq!(
            before.contains(Signal::SIGCHLD),
            after.contains(Signal::SIGCHLD)
        );
    }

    #[test]
    fn background_job_runs_detached() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("bg.txt");
        let line = format!("echo done > {}", marker.display());
        let tree = crate::parse::parse(&crate::parse::split_words(&line)).unwrap();

        let pid = run_background(&tree, ProcessLauncher::default()).unwrap();
        let status = waitpid(pid, None).unwrap();
        assert_eq!(status, WaitStatus::Exited(pid, BACKGROUND_SUCCESS));
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "done\n");
    }

    #[test]
    fn background_failure_exit_status() {
        let tree = crate::parse::parse(&crate::parse::split_words("false")).unwrap();
        let pid = run_background(&tree, ProcessLauncher::default()).unwrap();
        assert_eq!(
            waitpid(pid, None).unwrap(),
            WaitStatus::Exited(pid, BACKGROUND_FAILURE)
        );
    }
}
