//! The common logger level.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// Logger level, normalized across frameworks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Off,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    All,

    /// No level of its own; the logger inherits from its parent.
    Inherit,

    /// A foreign level value no mapping recognizes.
    Unknown,
}

impl Level {
    /// Levels a caller may ask a logger to be set to.
    pub const ASSIGNABLE: [Level; 9] = [
        Level::Off,
        Level::Fatal,
        Level::Error,
        Level::Warn,
        Level::Info,
        Level::Debug,
        Level::Trace,
        Level::All,
        Level::Inherit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
            Self::All => "ALL",
            Self::Inherit => "INHERIT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// `true` when the logger carries a concrete level of its own.
    pub fn is_explicit(&self) -> bool {
        !matches!(self, Self::Inherit)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OFF" => Ok(Self::Off),
            "FATAL" => Ok(Self::Fatal),
            "ERROR" => Ok(Self::Error),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "INFO" => Ok(Self::Info),
            "DEBUG" => Ok(Self::Debug),
            "TRACE" => Ok(Self::Trace),
            "ALL" => Ok(Self::All),
            "INHERIT" | "NULL" | "" => Ok(Self::Inherit),
            _ => Err(ProbeError::Unsupported(format!("unknown level: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("info".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("WARNING".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!("null".parse::<Level>().unwrap(), Level::Inherit);
        assert!("verbose".parse::<Level>().is_err());
        assert!("unknown".parse::<Level>().is_err());
    }

    #[test]
    fn test_serialization() {
        assert_eq!(serde_json::to_string(&Level::Warn).unwrap(), "\"WARN\"");
        let level: Level = serde_json::from_str("\"INHERIT\"").unwrap();
        assert_eq!(level, Level::Inherit);
    }
}
