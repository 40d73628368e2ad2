//! Logback reached through the SLF4J static binding.
//!
//! The binding singleton may hand out any SLF4J backend, so the factory it
//! returns is checked against logback's `LoggerContext`. Logback has no root
//! accessor and no public parent link: the root is the logger named `ROOT`,
//! and parents are looked up by name each time they are needed.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use super::{assign_level, bind_class, mismatch, normalize_name, objects, read_level};
use super::FrameworkAdapter;
use crate::accessor::{
    AppenderAccessor, AppenderKind, CallPolicy, CapabilityAccessor, FactoryAccessor,
    FrameworkKind, Level, LoggerAccessor, OwningApplication, ROOT_LOGGER_NAME,
};
use crate::error::{ProbeError, Result};
use crate::foreign::{ObjectIdentity, ObjectRef, ValueKind};

pub(crate) const BINDER_CLASS: &str = "org.slf4j.impl.StaticLoggerBinder";
pub(crate) const CONTEXT_CLASS: &str = "ch.qos.logback.classic.LoggerContext";
pub(crate) const LOGGER_CLASS: &str = "ch.qos.logback.classic.Logger";
pub(crate) const LEVEL_CLASS: &str = "ch.qos.logback.classic.Level";
pub(crate) const FILE_APPENDER_CLASS: &str = "ch.qos.logback.core.FileAppender";
pub(crate) const CONSOLE_APPENDER_CLASS: &str = "ch.qos.logback.core.ConsoleAppender";

/// Package prefix of the server's repackaged logback.
pub const TOMCAT_PREFIX: &str = "org.apache.juli.logging.";

/// Name the root logger is registered under.
const RESERVED_ROOT_NAME: &str = "ROOT";

/// Class names of one logback packaging.
#[derive(Debug, Clone)]
struct ClassNames {
    binder: String,
    context: String,
    level: String,
    file_appender: String,
    console_appender: String,
}

impl ClassNames {
    fn with_prefix(prefix: &str) -> Self {
        Self {
            binder: format!("{}{}", prefix, BINDER_CLASS),
            context: format!("{}{}", prefix, CONTEXT_CLASS),
            level: format!("{}{}", prefix, LEVEL_CLASS),
            file_appender: format!("{}{}", prefix, FILE_APPENDER_CLASS),
            console_appender: format!("{}{}", prefix, CONSOLE_APPENDER_CLASS),
        }
    }
}

/// Adapter for logback, plain or repackaged under a package prefix.
#[derive(Debug, Clone)]
pub struct LogbackAdapter {
    kind: FrameworkKind,
    classes: Arc<ClassNames>,
}

impl LogbackAdapter {
    /// Logback under its own package names.
    pub fn standard() -> Self {
        Self {
            kind: FrameworkKind::Logback,
            classes: Arc::new(ClassNames::with_prefix("")),
        }
    }

    /// Logback repackaged inside the server's logging namespace.
    pub fn tomcat() -> Self {
        Self {
            kind: FrameworkKind::TomcatLogback,
            classes: Arc::new(ClassNames::with_prefix(TOMCAT_PREFIX)),
        }
    }
}

impl FrameworkAdapter for LogbackAdapter {
    fn kind(&self) -> FrameworkKind {
        self.kind
    }

    fn locate(
        &self,
        app: &Arc<OwningApplication>,
        policy: CallPolicy,
    ) -> Result<CapabilityAccessor> {
        let binder_class = bind_class(self.kind, app, policy, &self.classes.binder)?;
        let binder = binder_class
            .call_object("getSingleton")
            .map_err(|e| mismatch(self.kind, e))?
            .ok_or_else(|| mismatch(self.kind, "getSingleton() returned null"))?;
        let factory = binder_class
            .rebind(binder)
            .call_object("getLoggerFactory")
            .map_err(|e| mismatch(self.kind, e))?
            .ok_or_else(|| mismatch(self.kind, "getLoggerFactory() returned null"))?;
        let factory = binder_class.rebind(factory);
        if !factory.is_instance_of(&self.classes.context) {
            return Err(mismatch(
                self.kind,
                format!(
                    "the SLF4J binding is {}, not logback",
                    factory.target().type_info().name
                ),
            ));
        }
        Ok(factory)
    }

    fn wrap(&self, factory: CapabilityAccessor) -> Box<dyn FactoryAccessor> {
        Box::new(LogbackFactory {
            kind: self.kind,
            classes: self.classes.clone(),
            context: factory,
        })
    }
}

#[derive(Debug)]
struct LogbackFactory {
    kind: FrameworkKind,
    classes: Arc<ClassNames>,
    context: CapabilityAccessor,
}

impl LogbackFactory {
    fn wrap_logger(&self, logger: ObjectRef) -> Box<dyn LoggerAccessor> {
        Box::new(LogbackLogger {
            kind: self.kind,
            classes: self.classes.clone(),
            logger: self.context.rebind(logger),
            context: self.context.clone(),
        })
    }
}

impl FactoryAccessor for LogbackFactory {
    fn framework(&self) -> FrameworkKind {
        self.kind
    }

    fn application(&self) -> &str {
        self.context.application().name()
    }

    fn root_logger(&self) -> Result<Option<Box<dyn LoggerAccessor>>> {
        let root = self.context.call_with_str("getLogger", RESERVED_ROOT_NAME)?;
        Ok(self
            .context
            .expect_object("getLogger", root)?
            .map(|logger| self.wrap_logger(logger)))
    }

    fn logger(&self, name: &str) -> Result<Option<Box<dyn LoggerAccessor>>> {
        if name == ROOT_LOGGER_NAME || name == RESERVED_ROOT_NAME {
            return self.root_logger();
        }
        Ok(lookup_existing(&self.context, name)?.map(|logger| self.wrap_logger(logger)))
    }

    fn loggers(&self) -> Result<Vec<Box<dyn LoggerAccessor>>> {
        let loggers = self.context.call_list("getLoggerList")?;
        Ok(objects(loggers)
            .into_iter()
            .map(|logger| self.wrap_logger(logger))
            .collect())
    }
}

/// `LoggerContext.exists(name)`: the logger, or `None` without creating it.
fn lookup_existing(context: &CapabilityAccessor, name: &str) -> Result<Option<ObjectRef>> {
    let found = context.call_with_str("exists", name)?;
    Ok(context.expect_object("exists", found)?)
}

/// The name one level up, `None` above a top-level name.
fn parent_name(name: &str) -> Option<&str> {
    name.rfind(|c: char| c == '.' || c == '$').map(|i| &name[..i])
}

#[derive(Debug)]
struct LogbackLogger {
    kind: FrameworkKind,
    classes: Arc<ClassNames>,
    logger: CapabilityAccessor,
    /// Parent lookups go through the context by name.
    context: CapabilityAccessor,
}

impl LogbackLogger {
    fn sibling(&self, logger: ObjectRef) -> Box<dyn LoggerAccessor> {
        Box::new(LogbackLogger {
            kind: self.kind,
            classes: self.classes.clone(),
            logger: self.logger.rebind(logger),
            context: self.context.clone(),
        })
    }
}

impl LoggerAccessor for LogbackLogger {
    fn framework(&self) -> FrameworkKind {
        self.kind
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
        read_level(&self.logger, "toString", level_from_logback)
    }

    fn appenders(&self) -> Result<Vec<Box<dyn AppenderAccessor>>> {
        let logger_name = self.name()?;
        let attached = self.logger.call_list("iteratorForAppenders")?;
        Ok(objects(attached)
            .into_iter()
            .map(|appender| {
                Box::new(LogbackAppender::new(
                    self.kind,
                    &self.classes,
                    self.logger.rebind(appender),
                    logger_name.clone(),
                )) as Box<dyn AppenderAccessor>
            })
            .collect())
    }

    fn parent(&self) -> Result<Option<Box<dyn LoggerAccessor>>> {
        let name = self.name()?;
        if name == ROOT_LOGGER_NAME {
            return Ok(None);
        }
        let mut candidate = parent_name(&name);
        let mut hops = 0;
        while let Some(parent) = candidate {
            hops += 1;
            if hops > self.max_hierarchy_depth() {
                return Err(ProbeError::HierarchyTooDeep(self.max_hierarchy_depth()));
            }
            if let Some(found) = lookup_existing(&self.context, parent)? {
                return Ok(Some(self.sibling(found)));
            }
            candidate = parent_name(parent);
        }
        let root = self.context.call_with_str("getLogger", RESERVED_ROOT_NAME)?;
        Ok(self
            .context
            .expect_object("getLogger", root)?
            .map(|logger| self.sibling(logger)))
    }

    fn can_set_level(&self) -> bool {
        self.logger
            .has_capability("setLevel", &[ValueKind::Object(self.classes.level.clone())])
    }

    fn set_level(&self, level: Level) -> Result<()> {
        let name = self.name()?;
        if !self.can_set_level() {
            return Err(ProbeError::Unsupported(format!(
                "{} logger {} has no setLevel",
                self.kind, name
            )));
        }
        let foreign = match level {
            Level::Inherit if name == ROOT_LOGGER_NAME => {
                return Err(ProbeError::Unsupported(
                    "the logback root logger cannot inherit a level".to_string(),
                ))
            }
            Level::Inherit => None,
            Level::Fatal | Level::Unknown => {
                return Err(ProbeError::Unsupported(format!(
                    "logback has no {} level",
                    level
                )))
            }
            other => Some(other.as_str()),
        };
        assign_level(&self.logger, &self.classes.level, "toLevel", foreign)?;
        info!("{}: {} logger {} set to {}", self.application(), self.kind, name, level);
        Ok(())
    }

    fn max_hierarchy_depth(&self) -> usize {
        self.logger.policy().max_hierarchy_depth
    }
}

#[derive(Debug)]
struct LogbackAppender {
    kind: FrameworkKind,
    appender: CapabilityAccessor,
    logger_name: String,
    appender_kind: AppenderKind,
}

impl LogbackAppender {
    fn new(
        kind: FrameworkKind,
        classes: &ClassNames,
        appender: CapabilityAccessor,
        logger_name: String,
    ) -> Self {
        let appender_kind = if appender.is_instance_of(&classes.file_appender) {
            AppenderKind::File
        } else if appender.is_instance_of(&classes.console_appender) {
            AppenderKind::Console
        } else {
            AppenderKind::Other
        };
        Self {
            kind,
            appender,
            logger_name,
            appender_kind,
        }
    }
}

impl AppenderAccessor for LogbackAppender {
    fn framework(&self) -> FrameworkKind {
        self.kind
    }

    fn application(&self) -> &str {
        self.appender.application().name()
    }

    fn identity(&self) -> ObjectIdentity {
        self.appender.identity()
    }

    fn logger_name(&self) -> &str {
        &self.logger_name
    }

    fn name(&self) -> Result<String> {
        Ok(self.appender.call_string("getName")?.unwrap_or_default())
    }

    fn kind(&self) -> AppenderKind {
        self.appender_kind
    }

    fn file(&self) -> Result<Option<PathBuf>> {
        if self.appender_kind != AppenderKind::File {
            return Ok(None);
        }
        Ok(self
            .appender
            .call_string("getFile")?
            .filter(|raw| !raw.is_empty())
            .map(|raw| self.appender.application().resolve_path(raw)))
    }
}

fn level_from_logback(name: &str) -> Level {
    match name {
        "OFF" => Level::Off,
        "ERROR" => Level::Error,
        "WARN" => Level::Warn,
        "INFO" => Level::Info,
        "DEBUG" => Level::Debug,
        "TRACE" => Level::Trace,
        "ALL" => Level::All,
        _ => Level::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::{build_context, ApplicationDescription};
    use crate::foreign::DynamicContext;

    fn billing(framework: &str) -> ApplicationDescription {
        toml::from_str(&format!(
            r#"
            name = "billing"
            work_dir = "/apps/billing"
            framework = "{}"

            [[loggers]]
            name = "root"
            level = "WARN"
            appenders = ["file"]

            [[loggers]]
            name = "com.billing"
            level = "INFO"
            appenders = ["file", "audit"]

            [[loggers]]
            name = "com.billing.invoices.pdf"
            appenders = ["audit"]

            [[appenders]]
            name = "file"
            kind = "file"
            file = "logs/billing.log"

            [[appenders]]
            name = "audit"
            kind = "file"
            file = "/var/log/billing-audit.log"
            "#,
            framework
        ))
        .unwrap()
    }

    fn factory(adapter: &LogbackAdapter, framework: &str) -> Box<dyn FactoryAccessor> {
        let ctx = build_context(&billing(framework));
        let app = OwningApplication::new("billing", "/apps/billing", ctx);
        adapter.build(&app, CallPolicy::inline()).unwrap()
    }

    #[test]
    fn test_root_by_reserved_name() {
        let factory = factory(&LogbackAdapter::standard(), "logback");
        let root = factory.root_logger().unwrap().unwrap();
        assert_eq!(root.name().unwrap(), ROOT_LOGGER_NAME);
        assert_eq!(root.level().unwrap(), Level::Warn);
        assert!(root.parent().unwrap().is_none());
    }

    #[test]
    fn test_parent_found_by_name() {
        let factory = factory(&LogbackAdapter::standard(), "logback");
        let pdf = factory.logger("com.billing.invoices.pdf").unwrap().unwrap();
        let parent = pdf.parent().unwrap().unwrap();
        assert_eq!(parent.name().unwrap(), "com.billing");
        assert_eq!(pdf.effective_level().unwrap(), Level::Info);

        let grandparent = parent.parent().unwrap().unwrap();
        assert!(grandparent.is_root().unwrap());
    }

    #[test]
    fn test_appenders_full_scan() {
        let factory = factory(&LogbackAdapter::standard(), "logback");
        let appenders = factory.appenders().unwrap();
        let mut files: Vec<PathBuf> = appenders
            .iter()
            .filter_map(|a| a.file().unwrap())
            .collect();
        files.sort();
        assert_eq!(
            files,
            vec![
                PathBuf::from("/apps/billing/logs/billing.log"),
                PathBuf::from("/var/log/billing-audit.log"),
            ]
        );
    }

    #[test]
    fn test_fatal_is_unsupported() {
        let factory = factory(&LogbackAdapter::standard(), "logback");
        let logger = factory.logger("com.billing").unwrap().unwrap();
        assert!(matches!(
            logger.set_level(Level::Fatal),
            Err(ProbeError::Unsupported(_))
        ));
        assert_eq!(logger.level().unwrap(), Level::Info);

        logger.set_level(Level::Trace).unwrap();
        assert_eq!(logger.level().unwrap(), Level::Trace);
    }

    #[test]
    fn test_tomcat_packaging_is_separate() {
        let tomcat = factory(&LogbackAdapter::tomcat(), "tomcat-logback");
        assert_eq!(tomcat.framework(), FrameworkKind::TomcatLogback);
        assert!(tomcat.root_logger().unwrap().is_some());

        let ctx = build_context(&billing("tomcat-logback"));
        let app = OwningApplication::new("billing", "/apps/billing", ctx);
        assert!(!LogbackAdapter::standard().can_handle(&app, CallPolicy::inline()));
    }

    #[test]
    fn test_other_slf4j_binding_does_not_apply() {
        let ctx = DynamicContext::new("simple");
        let factory = ctx.object("org.slf4j.impl.SimpleLoggerFactory").build();
        let binder = ctx
            .object(BINDER_CLASS)
            .constant("getLoggerFactory", factory)
            .build();
        ctx.define_class(BINDER_CLASS, ctx.statics().constant("getSingleton", binder));
        ctx.define_class(CONTEXT_CLASS, ctx.statics());
        let app = OwningApplication::new("simple", "/apps/simple", ctx);

        assert!(matches!(
            LogbackAdapter::standard().locate(&app, CallPolicy::inline()),
            Err(ProbeError::AdapterMismatch(m)) if m.contains("SimpleLoggerFactory")
        ));
    }

    #[test]
    fn test_parent_name() {
        assert_eq!(parent_name("a.b.c"), Some("a.b"));
        assert_eq!(parent_name("a.B$Inner"), Some("a.B"));
        assert_eq!(parent_name("a"), None);
    }
}
