//! Global tuning knobs that can be overridden from environment variables.
//!
//! An `EnvParam` holds the name of an environment variable and the textual form of its default
//! value. It is meant for parameters that are not common enough to deserve a dedicated
//! command-line flag but are worth tuning without recompiling, such as the penalty strength
//! used when quadratizing constraint encodings.
//!
//! ```
//! use env_param::EnvParam;
//! static PENALTY_STRENGTH: EnvParam<i64> = EnvParam::new("CARCONF_DOC_PENALTY_STRENGTH", "100");
//!
//! fn main() {
//!   // environment variable not set, using default value "100"
//!   assert_eq!(PENALTY_STRENGTH.get(), 100);
//! }
//! ```
//!
//! If the environment variable is set prior to the parameter's first access,
//! the value of the parameter is read from it.
//!
//! ```
//! use env_param::EnvParam;
//! static MERGE_RULES: EnvParam<bool> = EnvParam::new("CARCONF_DOC_MERGE_RULES", "true");
//!
//! fn main() {
//!   std::env::set_var("CARCONF_DOC_MERGE_RULES", "false");
//!   assert!(!MERGE_RULES.get());
//! }
//! ```
//!
//! A parameter is initialized once, on first read: later changes to the environment are ignored.
//! `EnvParam::set` forces the value and panics if the parameter was already initialized.
//! ```
//! use env_param::EnvParam;
//! static STRENGTH: EnvParam<i64> = EnvParam::new("CARCONF_DOC_STRENGTH", "100");
//!
//! fn main() {
//!   STRENGTH.set(10);
//!   assert_eq!(STRENGTH.get(), 10);
//!
//!   std::env::set_var("CARCONF_DOC_STRENGTH", "999"); // set after first read, ignored
//!   assert_eq!(STRENGTH.get(), 10);
//! }
//! ```

use std::str::FromStr;

pub struct EnvParam<T> {
    value: once_cell::sync::OnceCell<T>,
    env: &'static str,
    default: &'static str,
}

impl<T> EnvParam<T> {
    /// Creates a new parameter that will be initialized from the environment variable `env` or set
    /// `default` if the environment variable is not set.
    pub const fn new(env: &'static str, default: &'static str) -> EnvParam<T> {
        EnvParam {
            value: once_cell::sync::OnceCell::new(),
            env,
            default,
        }
    }
}

impl<T: FromStr> EnvParam<T> {
    fn read_default(&self) -> T {
        match T::from_str(self.default) {
            Ok(v) => v,
            Err(_) => {
                tracing::error!(env = self.env, default = self.default, "could not parse default value");
                panic!("[env_param] {}: invalid default value \"{}\".", self.env, self.default)
            }
        }
    }

    /// Returns the value of the parameter, reading the environment on the first call.
    ///
    /// # Panic
    /// Panics if the default value cannot be parsed.
    /// An environment value that cannot be parsed is reported as a warning and replaced by the default.
    pub fn get(&self) -> T
    where
        T: Copy,
    {
        *self.get_ref()
    }

    /// Returns a reference to the value of the parameter, reading the environment on the first call.
    ///
    /// # Panic
    /// Panics if the default value cannot be parsed.
    pub fn get_ref(&self) -> &T {
        let read = || match std::env::var(self.env) {
            Ok(param) => match T::from_str(&param) {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(
                        env = self.env,
                        value = %param,
                        default = self.default,
                        "could not parse environment value, using default"
                    );
                    self.read_default()
                }
            },
            Err(std::env::VarError::NotPresent) => self.read_default(),
            Err(err) => {
                tracing::warn!(env = self.env, default = self.default, "{err}, using default");
                self.read_default()
            }
        };
        self.value.get_or_init(read)
    }

    /// Set the parameter to the given value.
    ///
    /// # Panic
    /// Panics if the parameter has already been set, which typically means it has already been read.
    pub fn set(&self, value: T) {
        if self.value.set(value).is_err() {
            panic!(
                "Parameter {} is already initialized (i.e. was previously accessed).",
                self.env
            );
        }
    }
}
