use std::fmt::{Display, Formatter};

use hashbrown::HashMap;

use crate::errors::{Error, FormatError, Res};
use crate::naming::Var;

/// Boolean values of variables, as returned by a backend.
///
/// Variables that were never set read as false.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assignment {
    values: HashMap<Var, bool>,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, var: Var, value: bool) {
        self.values.insert(var, value);
    }

    pub fn with(mut self, var: Var, value: bool) -> Self {
        self.set(var, value);
        self
    }

    /// Value of the variable. A product variable reads as the conjunction of its factors.
    pub fn value(&self, var: &Var) -> bool {
        match var {
            Var::Product(a, b) => self.value(a) && self.value(b),
            _ => self.values.get(var).copied().unwrap_or(false),
        }
    }

    /// Parses an assignment with one `<name> <value>` (or `<name>=<value>`) pair per line.
    /// Values are `0`/`1` or `false`/`true`, blank lines are ignored.
    pub fn parse(text: &str) -> Res<Assignment> {
        let mut assignment = Assignment::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let err = |msg: &str| Error::from(FormatError::new(msg).at(None, i + 1, line));
            let mut parts = line.split(|c: char| c.is_whitespace() || c == '=').filter(|s| !s.is_empty());
            let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(err("expected a variable name and a value"));
            };
            let value = match value {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => return Err(err("invalid boolean value")),
            };
            assignment.set(name.parse()?, value);
        }
        Ok(assignment)
    }
}

impl FromIterator<(Var, bool)> for Assignment {
    fn from_iter<T: IntoIterator<Item = (Var, bool)>>(iter: T) -> Self {
        Assignment {
            values: iter.into_iter().collect(),
        }
    }
}

impl Display for Assignment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<_> = self.values.iter().collect();
        entries.sort();
        for (var, value) in entries {
            writeln!(f, "{var} {}", u8::from(*value))?;
        }
        Ok(())
    }
}
