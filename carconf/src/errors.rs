use std::fmt::{Debug, Display};

use annotate_snippets::*;
use thiserror::Error;

use crate::literal::TypeCode;

pub type Res<T> = std::result::Result<T, Error>;

/// Errors raised while parsing a catalogue or compiling it to constraints.
///
/// All of them abort the call that raised them: the compiler never returns a partial result.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("no encoding for implication pattern `{0}`")]
    UnhandledPattern(TypeCode),
    #[error("`{0}` does not follow the variable naming scheme")]
    NamingMismatch(String),
    #[error("invalid compilation options: {0}")]
    Config(String),
}

/// Line of a source text on which a format error was detected.
#[derive(Clone)]
struct Location {
    source: Option<String>,
    line_no: usize,
    line: String,
}

/// Malformed input, possibly located on a line of the input it was read from.
#[derive(Error, Clone)]
pub struct FormatError {
    message: String,
    location: Option<Location>,
}

impl FormatError {
    pub fn new(message: impl ToString) -> Self {
        FormatError {
            message: message.to_string(),
            location: None,
        }
    }

    pub fn failed<T>(self) -> std::result::Result<T, FormatError> {
        Err(self)
    }

    /// Attaches the line (1-based number and content) on which the error occurred.
    /// An error that is already located is left untouched.
    pub fn at(mut self, source: Option<&str>, line_no: usize, line: &str) -> Self {
        if self.location.is_none() {
            self.location = Some(Location {
                source: source.map(|s| s.to_string()),
                line_no,
                line: line.to_string(),
            });
        }
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn line_no(&self) -> Option<usize> {
        self.location.as_ref().map(|l| l.line_no)
    }
}

impl Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(loc) = &self.location else {
            return write!(f, "error: {}", self.message);
        };
        let annotation = AnnotationKind::Primary.span(0..loc.line.len()).label(&self.message);
        let snippet = Snippet::source(loc.line.as_str())
            .line_start(loc.line_no)
            .fold(true)
            .annotation(annotation);
        let snippet = if let Some(file) = loc.source.as_ref() {
            snippet.path(file.as_str())
        } else {
            snippet
        };
        let disp = Level::ERROR.primary_title(&self.message).elements([snippet]);
        let disp = Renderer::plain().render(&[disp]);
        f.write_str(&disp)
    }
}

impl Debug for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

pub trait Ctx<T> {
    /// Locates a format error on the given input line.
    fn on_line(self, source: Option<&str>, line_no: usize, line: &str) -> std::result::Result<T, FormatError>;
}

impl<T> Ctx<T> for std::result::Result<T, FormatError> {
    fn on_line(self, source: Option<&str>, line_no: usize, line: &str) -> std::result::Result<T, FormatError> {
        self.map_err(|e| e.at(source, line_no, line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn located_errors_mention_line_and_message() {
        let err = FormatError::new("mixed operators").at(Some("build.txt"), 12, "T0 : F1 & F2 | F3 => F4");
        assert_eq!(err.line_no(), Some(12));
        let rendered = err.to_string();
        assert!(rendered.contains("mixed operators"));
        assert!(rendered.contains("T0 : F1 & F2 | F3 => F4"));
        assert!(rendered.contains("build.txt"));
    }

    #[test]
    fn first_location_wins() {
        let err = FormatError::new("oops").at(None, 3, "a").at(None, 7, "b");
        assert_eq!(err.line_no(), Some(3));
    }
}
