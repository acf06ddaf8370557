//! Word-sequence contract shared by the session layer and the parser.

/// Opens a conditional block.
pub const IF: &str = "if";
/// Separates a block's condition from its body.
pub const DO: &str = "do";
/// Closes a conditional block.
pub const DONE: &str = "done";
/// Logical AND between two expressions.
pub const AND: &str = "&&";
/// Logical OR between two expressions.
pub const OR: &str = "||";
/// Trailing output redirection.
pub const REDIRECT: &str = ">";
/// Trailing background marker.
pub const BACKGROUND: &str = "&";
/// Statement separator, used to mark structural `do`/`done`.
pub const SEPARATOR: &str = ";";

/// Split a line into whitespace-delimited words.
///
/// No quoting or expansion is performed; a blank line yields no words.
pub fn split_words(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
}

/// Remove a trailing background marker. Returns true if one was removed.
pub fn strip_background(words: &mut Vec<String>) -> bool {
    if words.last().is_some_and(|w| w == BACKGROUND) {
        words.pop();
        true
    } else {
        false
    }
}

/// True for words that can never be a redirect destination.
pub fn is_reserved(word: &str) -> bool {
    matches!(word, IF | DO | DONE | AND | OR | REDIRECT | SEPARATOR)
}

/// True for the two logical operators.
pub fn is_operator(word: &str) -> bool {
    word == AND || word == OR
}
