use std::ops::Range;

use log::warn;

use super::tokenize::{AND, DO, DONE, IF, OR, REDIRECT, SEPARATOR, is_operator, is_reserved};
use super::types::{Command, Expression, ParseError};

/// Parse a whole line's words into an expression tree.
pub fn parse(words: &[String]) -> Result<Expression, ParseError> {
    parse_range(words, 0..words.len())
}

/// Parse the half-open range `range` of `words`.
///
/// The root is the first `&&` or `||` found outside any open `if` block,
/// scanning left to right. Without one, the range is either a single
/// `if ... do ... done` block or a single command.
pub fn parse_range(words: &[String], range: Range<usize>) -> Result<Expression, ParseError> {
    Parser::new(words).parse_range(range)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    If,
    Do,
    Done,
}

/// Running `if`/`do`/`done` counts for one scan over a range.
#[derive(Debug, Default, Clone)]
struct BlockCounter {
    if_count: usize,
    do_count: usize,
    done_count: usize,
    /// One entry per `do` still waiting for its `done`: whether that `do`
    /// followed a `;`.
    open: Vec<bool>,
}

impl BlockCounter {
    fn record(&mut self, keyword: Keyword, after_separator: bool) {
        match keyword {
            Keyword::If => self.if_count += 1,
            Keyword::Do => {
                self.do_count += 1;
                self.open.push(after_separator);
            }
            Keyword::Done => {
                self.done_count += 1;
                self.open.pop();
            }
        }
    }

    /// Not inside an unclosed `if`.
    fn outside_block(&self) -> bool {
        self.if_count == self.done_count
    }

    fn is_empty(&self) -> bool {
        self.if_count == 0 && self.do_count == 0 && self.done_count == 0
    }

    fn is_balanced(&self) -> bool {
        self.if_count == self.do_count && self.if_count == self.done_count
    }

    /// A bare `do` is awaited while some `if` still lacks one.
    fn awaits_bare_do(&self) -> bool {
        self.do_count < self.if_count
    }

    /// A bare `done` is awaited only by a block whose `do` was bare too.
    fn awaits_bare_done(&self) -> bool {
        self.done_count < self.do_count && self.open.last() == Some(&false)
    }

    fn malformed(&self) -> ParseError {
        ParseError::MalformedIfBlock {
            if_count: self.if_count,
            do_count: self.do_count,
            done_count: self.done_count,
        }
    }
}

/// Recursive-descent parser over one line's words.
///
/// Holds no mutable state; every call works on its own index range.
struct Parser<'a> {
    words: &'a [String],
}

impl<'a> Parser<'a> {
    fn new(words: &'a [String]) -> Self {
        Self { words }
    }

    fn parse_range(&self, range: Range<usize>) -> Result<Expression, ParseError> {
        let Range { start, end } = range;
        if start >= end || end > self.words.len() {
            return Err(ParseError::empty_operand());
        }

        let mut counter = BlockCounter::default();
        for i in start..end {
            if let Some(keyword) = self.classify(start, i, &counter) {
                counter.record(keyword, self.follows_separator(start, i));
            }

            let word = self.words[i].as_str();
            if counter.outside_block() && is_operator(word) {
                let left = self.parse_range(start..i)?;
                let right = self.parse_range(i + 1..end)?;
                return Ok(if word == AND {
                    Expression::and(left, right)
                } else {
                    debug_assert_eq!(word, OR);
                    Expression::or(left, right)
                });
            }
        }

        if counter.is_empty() {
            return self.command(start..end);
        }
        if !counter.is_balanced() {
            return Err(counter.malformed());
        }
        self.if_block(start..end, counter)
    }

    /// Decide whether the word at `i` is structural block syntax.
    ///
    /// `do` and `done` right after `;` always count. Without the `;` they
    /// count only when an open block is waiting for them, so `echo done`
    /// stays an ordinary command, and a block opened by `; do` also needs
    /// `; done`.
    fn classify(&self, start: usize, i: usize, counter: &BlockCounter) -> Option<Keyword> {
        let prev = if i > start {
            Some(self.words[i - 1].as_str())
        } else {
            None
        };
        let separated = prev == Some(SEPARATOR);
        match self.words[i].as_str() {
            IF if prev.is_none_or(|p| matches!(p, IF | DO | AND | OR)) => Some(Keyword::If),
            DO if separated || (prev.is_some() && counter.awaits_bare_do()) => Some(Keyword::Do),
            DONE if separated || (prev.is_some() && counter.awaits_bare_done()) => {
                Some(Keyword::Done)
            }
            _ => None,
        }
    }

    fn follows_separator(&self, start: usize, i: usize) -> bool {
        i > start && self.words[i - 1] == SEPARATOR
    }

    /// Split a balanced range into its condition and body.
    fn if_block(&self, range: Range<usize>, totals: BlockCounter) -> Result<Expression, ParseError> {
        let Range { start, end } = range;
        if self.words[start] != IF {
            return Err(totals.malformed());
        }

        let mut counter = BlockCounter::default();
        let mut do_index = None;
        let mut done_index = None;
        for i in start..end {
            let Some(keyword) = self.classify(start, i, &counter) else {
                continue;
            };
            counter.record(keyword, self.follows_separator(start, i));
            match keyword {
                Keyword::Do if do_index.is_none() && counter.if_count == counter.do_count => {
                    do_index = Some(i);
                }
                Keyword::Done if counter.if_count == counter.done_count => done_index = Some(i),
                _ => {}
            }
        }

        let (Some(do_index), Some(done_index)) = (do_index, done_index) else {
            return Err(totals.malformed());
        };
        let trailing = &self.words[done_index + 1..end];
        if do_index > done_index || !(trailing.is_empty() || trailing == [SEPARATOR]) {
            return Err(totals.malformed());
        }

        let condition = self.parse_range(start + 1..do_index)?;
        let body = self.parse_range(do_index + 1..done_index)?;
        Ok(Expression::if_block(condition, body))
    }

    /// Build a command leaf, pulling out `> target` pairs.
    ///
    /// The first valid target wins. A `>` with no usable destination is
    /// dropped with a warning and the command still runs.
    fn command(&self, range: Range<usize>) -> Result<Expression, ParseError> {
        let mut words = &self.words[range];
        if words.last().is_some_and(|w| w == SEPARATOR) {
            words = &words[..words.len() - 1];
        }

        let mut args = Vec::new();
        args.try_reserve_exact(words.len())
            .map_err(|_| ParseError::ResourceExhausted)?;
        let mut redirect: Option<String> = None;

        let mut i = 0;
        while i < words.len() {
            let word = &words[i];
            if word != REDIRECT {
                args.push(word.clone());
                i += 1;
                continue;
            }

            let program = words.first().map_or("", String::as_str);
            match words.get(i + 1).filter(|next| !is_reserved(next)) {
                Some(target) => {
                    match &redirect {
                        None => redirect = Some(target.clone()),
                        Some(kept) => {
                            warn!("{program}: extra redirect to {target} ignored, output stays on {kept}")
                        }
                    }
                    i += 2;
                }
                None => {
                    match &redirect {
                        None => warn!("{program}: no output file, redirect ignored"),
                        Some(kept) => warn!("{program}: no output file, redirect kept on {kept}"),
                    }
                    // The rejected candidate goes too, unless it is the next `>`.
                    match words.get(i + 1) {
                        Some(next) if next != REDIRECT => i += 2,
                        _ => i += 1,
                    }
                }
            }
        }

        Command::new(args, redirect).map(Expression::Command)
    }
}
