//! Runs one command leaf as a supervised child process.

use std::ffi::{CStr, CString, NulError};
use std::io::Write;

use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::fcntl::{OFlag, open};
use nix::libc;
use nix::sys::stat::Mode;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, close, dup2, fork};

use super::{ChildSignalsBlocked, clear_foreground, reset_child_signals, set_foreground};
use crate::config::JobsConfig;
use crate::eval::Launcher;
use crate::parse::Command;

/// Exit status reserved for "the program could not be started".
pub const DEFAULT_EXEC_FAILURE_STATUS: i32 = 42;
/// Permission bits for a newly created redirect target, before umask.
pub const DEFAULT_REDIRECT_MODE: u32 = 0o777;

const REDIRECT_FAILED: &[u8] = b"condsh: cannot redirect output, writing to stdout\n";

/// Forks, optionally redirects stdout, execs, and waits for the child.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    exec_failure_status: i32,
    redirect_mode: Mode,
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_EXEC_FAILURE_STATUS, DEFAULT_REDIRECT_MODE)
    }
}

impl ProcessLauncher {
    pub fn new(exec_failure_status: i32, redirect_mode: u32) -> Self {
        Self {
            exec_failure_status,
            redirect_mode: Mode::from_bits_truncate(redirect_mode as libc::mode_t),
        }
    }

    pub fn from_config(config: &JobsConfig) -> Self {
        let mut status = config.exec_failure_status;
        if status == 0 {
            warn!(
                "exec_failure_status 0 is indistinguishable from success, using {DEFAULT_EXEC_FAILURE_STATUS}"
            );
            status = DEFAULT_EXEC_FAILURE_STATUS;
        }
        Self::new(status, config.redirect_mode)
    }

    pub fn exec_failure_status(&self) -> i32 {
        self.exec_failure_status
    }

    /// Child side of the fork. Never returns.
    ///
    /// Everything here must be async-signal-safe: the argument vector, its
    /// pointer array and the redirect path were all built before forking.
    fn exec_child(&self, argv: &Argv, target: Option<&CStr>) -> ! {
        reset_child_signals();
        if let Some(path) = target
            && redirect_stdout(path, self.redirect_mode).is_err()
        {
            let _ = nix::unistd::write(std::io::stderr(), REDIRECT_FAILED);
        }
        argv.exec();
        unsafe { libc::_exit(self.exec_failure_status) }
    }

    /// Translate the child's wait status into success or failure.
    fn outcome(&self, command: &Command, pid: Pid, status: nix::Result<WaitStatus>) -> bool {
        match status {
            Ok(WaitStatus::Exited(_, 0)) => true,
            Ok(WaitStatus::Exited(_, code)) if code == self.exec_failure_status => {
                warn!("{}: could not execute", command.program());
                false
            }
            Ok(WaitStatus::Exited(_, code)) => {
                debug!("[{pid}] {command}: exit status {code}");
                false
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                info!("[{pid}] {command}: terminated by {signal}");
                false
            }
            Ok(WaitStatus::Stopped(_, signal)) => {
                info!("[{pid}] {command}: stopped ({signal})");
                false
            }
            Ok(other) => {
                debug!("[{pid}] {command}: unexpected wait status {other:?}");
                false
            }
            Err(e) => {
                error!("[{pid}] {command}: wait failed: {e}");
                false
            }
        }
    }
}

impl Launcher for ProcessLauncher {
    fn run(&self, command: &Command) -> bool {
        let program = command.program();
        let argv = match Argv::new(command.args()) {
            Ok(argv) => argv,
            Err(_) => {
                error!("{program}: argument contains a NUL byte");
                return false;
            }
        };
        let target = match command.redirect().map(CString::new).transpose() {
            Ok(target) => target,
            Err(_) => {
                error!("{program}: redirect target contains a NUL byte");
                return false;
            }
        };

        let _ = std::io::stdout().flush();
        let blocked = match ChildSignalsBlocked::new() {
            Ok(guard) => guard,
            Err(e) => {
                error!("{program}: {e}");
                return false;
            }
        };

        // SAFETY: the child runs only async-signal-safe calls before exec/_exit.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                blocked.restore_in_child();
                self.exec_child(&argv, target.as_deref())
            }
            Ok(ForkResult::Parent { child }) => {
                set_foreground(child);
                let status = wait_for(child);
                clear_foreground();
                drop(blocked);
                self.outcome(command, child, status)
            }
            Err(e) => {
                error!("{program}: fork failed: {e}");
                false
            }
        }
    }
}

/// Program words as C strings plus the NULL-terminated pointer array
/// `execvp(3)` takes.
struct Argv {
    words: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

impl Argv {
    fn new(words: &[String]) -> Result<Self, NulError> {
        let words = words
            .iter()
            .map(|w| CString::new(w.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        // The pointers stay valid when `words` moves: each CString owns its heap buffer.
        let ptrs = words
            .iter()
            .map(|w| w.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();
        Ok(Self { words, ptrs })
    }

    /// Replace the process image. Returns only if exec failed.
    fn exec(&self) {
        if let Some(program) = self.words.first() {
            // SAFETY: `ptrs` is NULL-terminated and points into `words`,
            // which outlives this call.
            unsafe { libc::execvp(program.as_ptr(), self.ptrs.as_ptr()) };
        }
    }
}

/// Open `path` create+truncate+write-only and make it stdout.
fn redirect_stdout(path: &CStr, mode: Mode) -> nix::Result<()> {
    let fd = open(
        path,
        OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
        mode,
    )?;
    if fd != libc::STDOUT_FILENO {
        dup2(fd, libc::STDOUT_FILENO)?;
        close(fd)?;
    }
    Ok(())
}

/// Block until `child` exits or stops.
fn wait_for(child: Pid) -> nix::Result<WaitStatus> {
    loop {
        match waitpid(child, Some(WaitPidFlag::WUNTRACED)) {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;
    use std::fs;

    fn cmd(words: &[&str]) -> Command {
        Command::new(words.iter().map(|w| w.to_string()).collect(), None).unwrap()
    }

    fn cmd_to(words: &[&str], target: &std::path::Path) -> Command {
        Command::new(
            words.iter().map(|w| w.to_string()).collect(),
            Some(target.to_string_lossy().into_owned()),
        )
        .unwrap()
    }

    fn launcher() -> ProcessLauncher {
        ProcessLauncher::default()
    }

    #[test]
    fn success_exit() {
        assert!(launcher().run(&cmd(&["true"])));
    }

    #[test]
    fn failure_exit() {
        assert!(!launcher().run(&cmd(&["false"])));
    }

    #[test]
    fn missing_program_fails() {
        assert!(!launcher().run(&cmd(&["/nonexistent/condsh-test-program"])));
    }

    #[test]
    fn killed_child_fails() {
        assert!(!launcher().run(&cmd(&["sh", "-c", "kill -9 $$"])));
    }

    #[test]
    fn nul_byte_fails_without_fork() {
        assert!(!launcher().run(&cmd(&["echo", "a\0b"])));
    }

    #[test]
    fn redirect_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        assert!(launcher().run(&cmd_to(&["echo", "hello"], &out)));
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello\n");
    }

    #[test]
    fn redirect_truncates_existing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        fs::write(&out, "a much longer previous content\n").unwrap();
        assert!(launcher().run(&cmd_to(&["echo", "new"], &out)));
        assert_eq!(fs::read_to_string(&out).unwrap(), "new\n");
    }

    /// Run `command` in a forked helper with umask 022 and report its result
    /// through the helper's exit status, so the test process keeps its own umask.
    fn run_with_umask_022(launcher: &ProcessLauncher, command: &Command) -> bool {
        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                nix::sys::stat::umask(Mode::from_bits_truncate(0o022));
                let ok = launcher.run(command);
                unsafe { libc::_exit(if ok { 0 } else { 1 }) }
            }
            ForkResult::Parent { child } => {
                waitpid(child, None).unwrap() == WaitStatus::Exited(child, 0)
            }
        }
    }

    fn mode_bits(path: &std::path::Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn redirect_target_created_rwx_under_umask() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("fresh.txt");
        assert!(run_with_umask_022(&launcher(), &cmd_to(&["true"], &out)));
        assert_eq!(mode_bits(&out), 0o777 & !0o022);
    }

    #[test]
    fn redirect_target_uses_configured_mode() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("fresh.txt");
        let launcher = ProcessLauncher::new(DEFAULT_EXEC_FAILURE_STATUS, 0o664);
        assert!(run_with_umask_022(&launcher, &cmd_to(&["true"], &out)));
        assert_eq!(mode_bits(&out), 0o644);
    }

    #[test]
    fn existing_target_keeps_its_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("old.txt");
        fs::write(&out, "old\n").unwrap();
        fs::set_permissions(&out, fs::Permissions::from_mode(0o600)).unwrap();
        assert!(launcher().run(&cmd_to(&["echo", "new"], &out)));
        assert_eq!(mode_bits(&out), 0o600);
    }

    #[test]
    fn argv_is_null_terminated() {
        let argv = Argv::new(&["echo".to_string(), "hi".to_string()]).unwrap();
        assert_eq!(argv.ptrs.len(), 3);
        assert!(argv.ptrs[2].is_null());
        assert_eq!(argv.ptrs[0], argv.words[0].as_ptr());
    }

    #[test]
    fn redirect_failure_still_runs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("missing-dir").join("out.txt");
        assert!(launcher().run(&cmd_to(&["true"], &out)));
        assert!(!out.exists());
    }

    #[test]
    fn custom_exec_failure_status() {
        let launcher = ProcessLauncher::new(97, DEFAULT_REDIRECT_MODE);
        assert!(!launcher.run(&cmd(&["/nonexistent/condsh-test-program"])));
    }

    #[test]
    fn zero_status_from_config_is_replaced() {
        let config = JobsConfig {
            exec_failure_status: 0,
            redirect_mode: DEFAULT_REDIRECT_MODE,
        };
        let launcher = ProcessLauncher::from_config(&config);
        assert_eq!(launcher.exec_failure_status(), DEFAULT_EXEC_FAILURE_STATUS);
    }

    #[test]
    fn outcome_translation() {
        let l = launcher();
        let c = cmd(&["prog"]);
        let pid = Pid::from_raw(1234);
        assert!(l.outcome(&c, pid, Ok(WaitStatus::Exited(pid, 0))));
        assert!(!l.outcome(&c, pid, Ok(WaitStatus::Exited(pid, 1))));
        assert!(!l.outcome(&c, pid, Ok(WaitStatus::Exited(pid, DEFAULT_EXEC_FAILURE_STATUS))));
        assert!(!l.outcome(&c, pid, Ok(WaitStatus::Signaled(pid, Signal::SIGKILL, false))));
        assert!(!l.outcome(&c, pid, Ok(WaitStatus::Stopped(pid, Signal::SIGSTOP))));
        assert!(!l.outcome(&c, pid, Err(Errno::ECHILD)));
    }
}
