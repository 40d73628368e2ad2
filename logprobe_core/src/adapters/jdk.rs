//! The platform's built-in logging.
//!
//! The root is the logger registered under the empty name. Handlers carry no
//! name, so they are identified by their position on the logger. Only the
//! server's JULI file handlers are file-backed; their file name embeds the
//! current date.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use super::{assign_level, mismatch, normalize_name, objects, read_level, FrameworkAdapter};
use crate::accessor::{
    AppenderAccessor, AppenderKind, CallPolicy, CapabilityAccessor, FactoryAccessor,
    FrameworkKind, Level, LoggerAccessor, OwningApplication, ROOT_LOGGER_NAME,
};
use crate::error::{ProbeError, Result};
use crate::foreign::{ObjectIdentity, ObjectRef, ValueKind};

pub(crate) const LOG_MANAGER_CLASS: &str = "java.util.logging.LogManager";
pub(crate) const LOGGER_CLASS: &str = "java.util.logging.Logger";
pub(crate) const LEVEL_CLASS: &str = "java.util.logging.Level";
pub(crate) const FILE_HANDLER_CLASS: &str = "org.apache.juli.FileHandler";
pub(crate) const CONSOLE_HANDLER_CLASS: &str = "java.util.logging.ConsoleHandler";

/// Name the root logger is registered under.
const RESERVED_ROOT_NAME: &str = "";

const KIND: FrameworkKind = FrameworkKind::Jdk;

/// Adapter for `java.util.logging`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JdkAdapter;

impl FrameworkAdapter for JdkAdapter {
    fn kind(&self) -> FrameworkKind {
        KIND
    }

    fn locate(
        &self,
        app: &Arc<OwningApplication>,
        policy: CallPolicy,
    ) -> Result<CapabilityAccessor> {
        let class = super::bind_class(KIND, app, policy, LOG_MANAGER_CLASS)?;
        let manager = class
            .call_object("getLogManager")
            .map_err(|e| mismatch(KIND, e))?
            .ok_or_else(|| mismatch(KIND, "getLogManager() returned null"))?;
        let manager = class.rebind(manager);
        if !manager.is_instance_of(LOG_MANAGER_CLASS) {
            return Err(mismatch(KIND, "getLogManager() did not return a LogManager"));
        }
        Ok(manager)
    }

    fn wrap(&self, factory: CapabilityAccessor) -> Box<dyn FactoryAccessor> {
        Box::new(JdkFactory { manager: factory })
    }
}

#[derive(Debug)]
struct JdkFactory {
    manager: CapabilityAccessor,
}

impl JdkFactory {
    fn lookup(&self, raw_name: &str) -> Result<Option<Box<dyn LoggerAccessor>>> {
        let found = self.manager.call_with_str("getLogger", raw_name)?;
        Ok(self
            .manager
            .expect_object("getLogger", found)?
            .map(|logger| wrap_logger(&self.manager, logger)))
    }
}

fn wrap_logger(owner: &CapabilityAccessor, logger: ObjectRef) -> Box<dyn LoggerAccessor> {
    Box::new(JdkLogger {
        logger: owner.rebind(logger),
    })
}

impl FactoryAccessor for JdkFactory {
    fn framework(&self) -> FrameworkKind {
        KIND
    }

    fn application(&self) -> &str {
        self.manager.application().name()
    }

    fn root_logger(&self) -> Result<Option<Box<dyn LoggerAccessor>>> {
        self.lookup(RESERVED_ROOT_NAME)
    }

    fn logger(&self, name: &str) -> Result<Option<Box<dyn LoggerAccessor>>> {
        if name == ROOT_LOGGER_NAME {
            return self.root_logger();
        }
        self.lookup(name)
    }

    fn loggers(&self) -> Result<Vec<Box<dyn LoggerAccessor>>> {
        let names = self.manager.call_list("getLoggerNames")?;
        let mut loggers = Vec::new();
        for name in names.iter().filter_map(|n| n.as_str()) {
            // Loggers are weakly held and may vanish between the two calls.
            match self.lookup(name) {
                Ok(Some(logger)) => loggers.push(logger),
                Ok(None) => {}
                Err(e) => warn!(
                    "{}: skipping logger {:?}: {}",
                    self.application(),
                    name,
                    e
                ),
            }
        }
        Ok(loggers)
    }
}

#[derive(Debug)]
struct JdkLogger {
    logger: CapabilityAccessor,
}

impl LoggerAccessor for JdkLogger {
    fn framework(&self) -> FrameworkKind {
        KIND
    }

    fn application(&self) -> &str {
        self.logger.application().name()
    }

    fn identity(&self) -> ObjectIdentity {
        self.logger.identity()
    }

    fn name(&self) -> Result<String> {
        Ok(normalize_name(
            self.logger.call_string("getName")?,
            &[RESERVED_ROOT_NAME],
        ))
    }

    fn level(&self) -> Result<Level> {
        read_level(&self.logger, "getName", level_from_jdk)
    }

    fn appenders(&self) -> Result<Vec<Box<dyn AppenderAccessor>>> {
        let logger_name = self.name()?;
        let handlers = self.logger.call_list("getHandlers")?;
        Ok(objects(handlers)
            .into_iter()
            .enumerate()
            .map(|(index, handler)| {
                Box::new(JdkHandler::new(
                    self.logger.rebind(handler),
                    logger_name.clone(),
                    index,
                )) as Box<dyn AppenderAccessor>
            })
            .collect())
    }

    fn parent(&self) -> Result<Option<Box<dyn LoggerAccessor>>> {
        Ok(self
            .logger
            .call_object("getParent")?
            .map(|parent| wrap_logger(&self.logger, parent)))
    }

    fn can_set_level(&self) -> bool {
        self.logger
            .has_capability("setLevel", &[ValueKind::Object(LEVEL_CLASS.to_string())])
    }

    fn set_level(&self, level: Level) -> Result<()> {
        let name = self.name()?;
        if !self.can_set_level() {
            return Err(ProbeError::Unsupported(format!(
                "logger {} has no setLevel",
                name
            )));
        }
        let foreign = match level {
            Level::Inherit if name == ROOT_LOGGER_NAME => {
                return Err(ProbeError::Unsupported(
                    "the root logger cannot inherit a level".to_string(),
                ))
            }
            Level::Inherit => None,
            other => Some(level_to_jdk(other).ok_or_else(|| {
                ProbeError::Unsupported(format!("{} has no java.util.logging equivalent", other))
            })?),
        };
        assign_level(&self.logger, LEVEL_CLASS, "parse", foreign)?;
        info!("{}: logger {} set to {}", self.application(), name, level);
        Ok(())
    }

    fn max_hierarchy_depth(&self) -> usize {
        self.logger.policy().max_hierarchy_depth
    }
}

#[derive(Debug)]
struct JdkHandler {
    handler: CapabilityAccessor,
    logger_name: String,
    index: usize,
    kind: AppenderKind,
}

impl JdkHandler {
    fn new(handler: CapabilityAccessor, logger_name: String, index: usize) -> Self {
        let kind = if handler.is_instance_of(FILE_HANDLER_CLASS) {
            AppenderKind::File
        } else if handler.is_instance_of(CONSOLE_HANDLER_CLASS) {
            AppenderKind::Console
        } else {
            AppenderKind::Other
        };
        Self {
            handler,
            logger_name,
            index,
            kind,
        }
    }
}

impl AppenderAccessor for JdkHandler {
    fn framework(&self) -> FrameworkKind {
        KIND
    }

    fn application(&self) -> &str {
        self.handler.application().name()
    }

    fn identity(&self) -> ObjectIdentity {
        self.handler.identity()
    }

    fn logger_name(&self) -> &str {
        &self.logger_name
    }

    fn name(&self) -> Result<String> {
        Ok(self.index.to_string())
    }

    fn kind(&self) -> AppenderKind {
        self.kind
    }

    fn file(&self) -> Result<Option<PathBuf>> {
        if self.kind != AppenderKind::File {
            return Ok(None);
        }
        let directory = self.handler.call_string("getDirectory")?.unwrap_or_else(|| "logs".into());
        let prefix = self.handler.call_string("getPrefix")?.unwrap_or_else(|| "juli.".into());
        let suffix = self.handler.call_string("getSuffix")?.unwrap_or_else(|| ".log".into());
        let file_name = format!("{}{}{}", prefix, Local::now().format("%Y-%m-%d"), suffix);
        Ok(Some(
            self.handler
                .application()
                .resolve_path(PathBuf::from(directory).join(file_name)),
        ))
    }
}

fn level_from_jdk(name: &str) -> Level {
    match name {
        "OFF" => Level::Off,
        "SEVERE" => Level::Error,
        "WARNING" => Level::Warn,
        "INFO" | "CONFIG" => Level::Info,
        "FINE" => Level::Debug,
        "FINER" | "FINEST" => Level::Trace,
        "ALL" => Level::All,
        _ => Level::Unknown,
    }
}

fn level_to_jdk(level: Level) -> Option<&'static str> {
    match level {
        Level::Off => Some("OFF"),
        Level::Error => Some("SEVERE"),
        Level::Warn => Some("WARNING"),
        Level::Info => Some("INFO"),
        Level::Debug => Some("FINE"),
        Level::Trace => Some("FINEST"),
        Level::All => Some("ALL"),
        Level::Fatal | Level::Inherit | Level::Unknown => None,
    }
}
