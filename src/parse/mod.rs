pub mod shell;
pub mod tokenize;
pub mod types;

pub use shell::{parse, parse_range};
pub use tokenize::{split_words, strip_background};
pub use types::{Command, Expression, ParseError};
