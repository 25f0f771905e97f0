//! Run environment of the process, read from `RUN_ENV`.

use std::{fmt, str::FromStr};

/// Name of the environment variable selecting the run environment.
pub const RUN_ENV_VAR: &str = "RUN_ENV";

/// Deployment mode of the running service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RunEnv {
    /// A developer machine. Relaxes TLS certificate checks.
    Local,
    Dev,
    Debug,
    #[default]
    Release,
}

impl RunEnv {
    /// Reads `RUN_ENV`. Unset or unknown values mean [`RunEnv::Release`].
    pub fn current() -> Self {
        std::env::var(RUN_ENV_VAR)
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    /// Parses a run environment name, case-insensitively. Unknown names mean release.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => RunEnv::Local,
            "dev" => RunEnv::Dev,
            "debug" => RunEnv::Debug,
            _ => RunEnv::Release,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunEnv::Local => "local",
            RunEnv::Dev => "dev",
            RunEnv::Debug => "debug",
            RunEnv::Release => "release",
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, RunEnv::Local)
    }

    pub fn is_release(&self) -> bool {
        matches!(self, RunEnv::Release)
    }
}

impl FromStr for RunEnv {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(value))
    }
}

impl fmt::Display for RunEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
