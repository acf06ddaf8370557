//! Tree evaluation with short-circuit `&&`/`||` and vacuously true `if`.

use log::debug;

use crate::parse::{Command, Expression};

/// Runs a single command leaf and reports whether it succeeded.
///
/// The process-backed implementation is [`crate::jobs::ProcessLauncher`];
/// tests substitute recording launchers.
pub trait Launcher {
    fn run(&self, command: &Command) -> bool;
}

impl<L: Launcher + ?Sized> Launcher for &L {
    fn run(&self, command: &Command) -> bool {
        (**self).run(command)
    }
}

/// Walks an expression tree depth-first, left to right.
pub struct Evaluator<L> {
    launcher: L,
}

impl<L: Launcher> Evaluator<L> {
    pub fn new(launcher: L) -> Self {
        Self { launcher }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Evaluate `expr`, returning true on success.
    ///
    /// - `a || b` runs `b` only if `a` failed.
    /// - `a && b` runs `b` only if `a` succeeded.
    /// - `if c do b done` runs `b` only if `c` succeeded, and succeeds
    ///   without running `b` when `c` fails.
    pub fn eval(&self, expr: &Expression) -> bool {
        match expr {
            Expression::Command(command) => {
                let ok = self.launcher.run(command);
                debug!("[{command}] -> {}", if ok { "success" } else { "failure" });
                ok
            }
            Expression::Or { left, right } => self.eval(left) || self.eval(right),
            Expression::And { left, right } => self.eval(left) && self.eval(right),
            Expression::If { condition, body } => {
                if self.eval(condition) {
                    self.eval(body)
                } else {
                    true
                }
            }
        }
    }
}
