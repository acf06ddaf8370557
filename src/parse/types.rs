//! Types produced by the parser and consumed by the eval layer.

use serde::Serialize;
use std::fmt;

/// A single program invocation: argument words plus an optional output file.
///
/// The argument list is never empty; element 0 is the program name.
/// Redirection words (`>` and its target) are never part of `args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<String>,
}

impl Command {
    /// Build a command, rejecting an empty argument list.
    pub fn new(args: Vec<String>, redirect: Option<String>) -> Result<Self, ParseError> {
        if args.is_empty() {
            return Err(ParseError::EmptyCommand);
        }
        Ok(Self { args, redirect })
    }

    /// The program name (first word).
    pub fn program(&self) -> &str {
        &self.args[0]
    }

    /// All words passed to the program, program name included.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Destination file for standard output, if one was given.
    pub fn redirect(&self) -> Option<&str> {
        self.redirect.as_deref()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = self.args.iter().map(String::as_str);
        match shlex::try_join(words) {
            Ok(joined) => f.write_str(&joined)?,
            Err(_) => f.write_str(&self.args.join(" "))?,
        }
        if let Some(target) = &self.redirect {
            write!(f, " > {target}")?;
        }
        Ok(())
    }
}

/// Abstract syntax tree for one input line.
///
/// Each node owns its children; a tree lives for exactly one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    /// Leaf: run a program.
    Command(Command),
    /// `if <condition> do <body> done`
    If {
        condition: Box<Expression>,
        body: Box<Expression>,
    },
    /// `<left> || <right>`
    Or {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `<left> && <right>`
    And {
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn if_block(condition: Expression, body: Expression) -> Self {
        Expression::If {
            condition: Box::new(condition),
            body: Box::new(body),
        }
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::Or {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Number of command leaves in the tree.
    pub fn command_count(&self) -> usize {
        match self {
            Expression::Command(_) => 1,
            Expression::If { condition, body } => condition.command_count() + body.command_count(),
            Expression::Or { left, right } | Expression::And { left, right } => {
                left.command_count() + right.command_count()
            }
        }
    }
}

/// Structural failure while building the tree for a line.
///
/// Any of these abandons the whole line; no partial tree reaches evaluation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Unbalanced `if`/`do`/`done`, stray words after a block, or an empty operand.
    #[error("malformed if block (if:{if_count}, do:{do_count}, done:{done_count})")]
    MalformedIfBlock {
        if_count: usize,
        do_count: usize,
        done_count: usize,
    },
    /// Memory for the command's argument list could not be reserved.
    #[error("out of memory while building command")]
    ResourceExhausted,
    /// Nothing left to run once separators and redirections were removed.
    #[error("empty command")]
    EmptyCommand,
}

impl ParseError {
    /// A malformed block with no keywords counted, used for empty operands.
    pub(crate) fn empty_operand() -> Self {
        ParseError::MalformedIfBlock {
            if_count: 0,
            do_count: 0,
            done_count: 0,
        }
    }
}
