use std::convert::TryFrom;
use std::fmt::Display;

/// Text of a catalogue file, together with where it was read from.
pub struct Input {
    pub(crate) text: String,
    pub(crate) source: Option<String>,
}

impl Input {
    pub fn from_string(input: impl ToString) -> Input {
        Input {
            text: input.to_string(),
            source: None,
        }
    }

    pub fn from_file(file: &std::path::Path) -> std::result::Result<Input, std::io::Error> {
        let s = std::fs::read_to_string(file)?;
        Ok(Input {
            text: s,
            source: Some(file.display().to_string()),
        })
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Lines of the input, numbered from 1 and stripped of trailing whitespace.
    pub(crate) fn numbered_lines(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.text.lines().enumerate().map(|(i, l)| (i + 1, l.trim_end()))
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Input::from_string(s)
    }
}

impl TryFrom<&std::path::Path> for Input {
    type Error = std::io::Error;

    fn try_from(value: &std::path::Path) -> Result<Self, Self::Error> {
        Input::from_file(value)
    }
}

impl Display for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{src}"),
            None => write!(f, "<string>"),
        }
    }
}
