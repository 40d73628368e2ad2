//! The uniform model every framework adapter produces.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::level::Level;
use crate::error::{ProbeError, Result};
use crate::foreign::ObjectIdentity;

/// Canonical name of every framework's root logger.
pub const ROOT_LOGGER_NAME: &str = "root";

/// The logging framework shapes the adapters understand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameworkKind {
    /// The platform's built-in logging (`java.util.logging` with JULI handlers).
    Jdk,

    /// Classic tree-structured log4j.
    Log4j,

    /// Logback behind the SLF4J static binding.
    Logback,

    /// Logback repackaged under the server's internal logging namespace.
    TomcatLogback,
}

impl FrameworkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jdk => "jdk",
            Self::Log4j => "log4j",
            Self::Logback => "logback",
            Self::TomcatLogback => "tomcat-logback",
        }
    }
}

impl fmt::Display for FrameworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameworkKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "jdk" | "jul" => Ok(Self::Jdk),
            "log4j" => Ok(Self::Log4j),
            "logback" => Ok(Self::Logback),
            "tomcat-logback" | "tomcatslf4jlogback" => Ok(Self::TomcatLogback),
            _ => Err(ProbeError::NotFound(format!("unknown logging framework: {}", s))),
        }
    }
}

/// What an appender writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppenderKind {
    File,
    Console,
    Other,
}

/// Wraps a framework's root or factory object.
pub trait FactoryAccessor: Send + Sync + fmt::Debug {
    fn framework(&self) -> FrameworkKind;

    /// Name of the owning application.
    fn application(&self) -> &str;

    /// The root logger.
    fn root_logger(&self) -> Result<Option<Box<dyn LoggerAccessor>>>;

    /// The logger registered under `name`; `None` if there is none.
    ///
    /// The canonical root name resolves to the root logger.
    fn logger(&self, name: &str) -> Result<Option<Box<dyn LoggerAccessor>>>;

    /// Every logger the framework currently knows, root included.
    fn loggers(&self) -> Result<Vec<Box<dyn LoggerAccessor>>>;

    /// Every appender attached to any logger, each foreign object once.
    ///
    /// Visits all loggers, not only the hierarchy, because appenders are not
    /// guaranteed to propagate. A logger whose appenders cannot be read is
    /// skipped with a warning; only failure to enumerate the loggers
    /// themselves fails the call.
    fn appenders(&self) -> Result<Vec<Box<dyn AppenderAccessor>>> {
        let mut seen = HashSet::new();
        let mut appenders = Vec::new();
        for logger in self.loggers()? {
            match logger.appenders() {
                Ok(attached) => {
                    for appender in attached {
                        if seen.insert(appender.identity()) {
                            appenders.push(appender);
                        }
                    }
                }
                Err(e) => warn!(
                    "{}: skipping appenders of a {} logger: {}",
                    self.application(),
                    self.framework(),
                    e
                ),
            }
        }
        Ok(appenders)
    }
}

/// Wraps one foreign logger.
pub trait LoggerAccessor: Send + Sync + fmt::Debug {
    fn framework(&self) -> FrameworkKind;

    fn application(&self) -> &str;

    fn identity(&self) -> ObjectIdentity;

    /// Normalized name; every root is [`ROOT_LOGGER_NAME`].
    fn name(&self) -> Result<String>;

    /// The logger's own level, [`Level::Inherit`] when it has none.
    fn level(&self) -> Result<Level>;

    /// Appenders attached directly to this logger, in order.
    fn appenders(&self) -> Result<Vec<Box<dyn AppenderAccessor>>>;

    /// The parent logger; `None` at the root.
    fn parent(&self) -> Result<Option<Box<dyn LoggerAccessor>>>;

    /// Whether the level can be changed at runtime.
    fn can_set_level(&self) -> bool;

    /// Change the level. Fails with `Unsupported` rather than doing nothing.
    fn set_level(&self, level: Level) -> Result<()>;

    /// Bound applied to parent walks.
    fn max_hierarchy_depth(&self) -> usize;

    fn is_root(&self) -> Result<bool> {
        Ok(self.name()? == ROOT_LOGGER_NAME)
    }

    /// Parents from nearest to root.
    fn ancestors(&self) -> Result<Vec<Box<dyn LoggerAccessor>>> {
        let limit = self.max_hierarchy_depth();
        let mut chain: Vec<Box<dyn LoggerAccessor>> = Vec::new();
        let mut next = self.parent()?;
        while let Some(logger) = next {
            if chain.len() == limit {
                return Err(ProbeError::HierarchyTooDeep(limit));
            }
            next = logger.parent()?;
            chain.push(logger);
        }
        Ok(chain)
    }

    /// The level in force: the own level, else the nearest ancestor's.
    fn effective_level(&self) -> Result<Level> {
        let own = self.level()?;
        if own.is_explicit() {
            return Ok(own);
        }
        let limit = self.max_hierarchy_depth();
        let mut hops = 0;
        let mut next = self.parent()?;
        while let Some(ancestor) = next {
            if hops == limit {
                return Err(ProbeError::HierarchyTooDeep(limit));
            }
            let level = ancestor.level()?;
            if level.is_explicit() {
                return Ok(level);
            }
            hops += 1;
            next = ancestor.parent()?;
        }
        Ok(Level::Inherit)
    }

    fn info(&self) -> Result<LoggerInfo> {
        let appenders = self
            .appenders()?
            .iter()
            .map(|a| a.name())
            .collect::<Result<Vec<_>>>()?;
        Ok(LoggerInfo {
            application: self.application().to_string(),
            framework: self.framework(),
            name: self.name()?,
            level: self.level()?,
            effective_level: self.effective_level()?,
            level_mutable: self.can_set_level(),
            appenders,
        })
    }
}

/// Wraps one foreign appender.
pub trait AppenderAccessor: Send + Sync + fmt::Debug {
    fn framework(&self) -> FrameworkKind;

    fn application(&self) -> &str;

    fn identity(&self) -> ObjectIdentity;

    /// Name of the logger this appender was reached through.
    fn logger_name(&self) -> &str;

    fn name(&self) -> Result<String>;

    fn kind(&self) -> AppenderKind;

    /// Absolute path of the backing file; `None` for appenders that are not
    /// file-backed.
    fn file(&self) -> Result<Option<PathBuf>>;

    fn info(&self) -> Result<AppenderInfo> {
        let file = self.file()?;
        Ok(AppenderInfo {
            application: self.application().to_string(),
            framework: self.framework(),
            logger: self.logger_name().to_string(),
            name: self.name()?,
            kind: self.kind(),
            file_exists: file.as_ref().map(|f| f.exists()).unwrap_or(false),
            file,
        })
    }
}

/// Snapshot of a logger for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerInfo {
    pub application: String,
    pub framework: FrameworkKind,
    pub name: String,
    pub level: Level,
    pub effective_level: Level,
    pub level_mutable: bool,
    pub appenders: Vec<String>,
}

/// Snapshot of an appender for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppenderInfo {
    pub application: String,
    pub framework: FrameworkKind,
    pub logger: String,
    pub name: String,
    pub kind: AppenderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub file_exists: bool,
}
