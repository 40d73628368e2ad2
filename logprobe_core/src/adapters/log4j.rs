//! Classic tree-structured log4j.
//!
//! log4j exposes an explicit root (`LogManager.getRootLogger()`), real parent
//! links (`Category.getParent()`), and attaches appenders per logger.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use super::{assign_level, bind_class, mismatch, normalize_name, objects, read_level};
use super::FrameworkAdapter;
use crate::accessor::{
    AppenderAccessor, AppenderKind, CallPolicy, CapabilityAccessor, FactoryAccessor,
    FrameworkKind, Level, LoggerAccessor, OwningApplication, ROOT_LOGGER_NAME,
};
use crate::error::{ProbeError, Result};
use crate::foreign::{ObjectIdentity, ObjectRef, ValueKind};

pub(crate) const LOG_MANAGER_CLASS: &str = "org.apache.log4j.LogManager";
pub(crate) const LOGGER_CLASS: &str = "org.apache.log4j.Logger";
pub(crate) const LEVEL_CLASS: &str = "org.apache.log4j.Level";
pub(crate) const FILE_APPENDER_CLASS: &str = "org.apache.log4j.FileAppender";
pub(crate) const CONSOLE_APPENDER_CLASS: &str = "org.apache.log4j.ConsoleAppender";

const KIND: FrameworkKind = FrameworkKind::Log4j;

/// Adapter for log4j 1.x.
#[derive(Debug, Default, Clone, Copy)]
pub struct Log4jAdapter;

impl FrameworkAdapter for Log4jAdapter {
    fn kind(&self) -> FrameworkKind {
        KIND
    }

    fn locate(
        &self,
        app: &Arc<OwningApplication>,
        policy: CallPolicy,
    ) -> Result<CapabilityAccessor> {
        let manager = bind_class(KIND, app, policy, LOG_MANAGER_CLASS)?;
        let root = manager
            .call_object("getRootLogger")
            .map_err(|e| mismatch(KIND, e))?
            .ok_or_else(|| mismatch(KIND, "getRootLogger() returned null"))?;
        if !manager.rebind(root).is_instance_of(LOGGER_CLASS) {
            return Err(mismatch(KIND, "root logger is not an org.apache.log4j.Logger"));
        }
        Ok(manager)
    }

    fn wrap(&self, factory: CapabilityAccessor) -> Box<dyn FactoryAccessor> {
        Box::new(Log4jFactory { manager: factory })
    }
}

#[derive(Debug)]
struct Log4jFactory {
    manager: CapabilityAccessor,
}

impl Log4jFactory {
    fn wrap_logger(&self, logger: ObjectRef) -> Box<dyn LoggerAccessor> {
        Box::new(Log4jLogger {
            logger: self.manager.rebind(logger),
        })
    }
}

impl FactoryAccessor for Log4jFactory {
    fn framework(&self) -> FrameworkKind {
        KIND
    }

    fn application(&self) -> &str {
        self.manager.application().name()
    }

    fn root_logger(&self) -> Result<Option<Box<dyn LoggerAccessor>>> {
        Ok(self
            .manager
            .call_object("getRootLogger")?
            .map(|root| self.wrap_logger(root)))
    }

    fn logger(&self, name: &str) -> Result<Option<Box<dyn LoggerAccessor>>> {
        if name == ROOT_LOGGER_NAME {
            return self.root_logger();
        }
        // exists() answers null instead of creating the logger.
        let found = self.manager.call_with_str("exists", name)?;
        Ok(self
            .manager
            .expect_object("exists", found)?
            .map(|logger| self.wrap_logger(logger)))
    }

    fn loggers(&self) -> Result<Vec<Box<dyn LoggerAccessor>>> {
        // getCurrentLoggers() leaves the root out.
        let mut loggers: Vec<Box<dyn LoggerAccessor>> = self.root_logger()?.into_iter().collect();
        let current = self.manager.call_list("getCurrentLoggers")?;
        loggers.extend(objects(current).into_iter().map(|l| self.wrap_logger(l)));
        Ok(loggers)
    }
}

#[derive(Debug)]
struct Log4jLogger {
    logger: CapabilityAccessor,
}

impl LoggerAccessor for Log4jLogger {
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
        Ok(normalize_name(self.logger.call_string("getName")?, &[ROOT_LOGGER_NAME]))
    }

    fn level(&self) -> Result<Level> {
        read_level(&self.logger, "toString", level_from_log4j)
    }

    fn appenders(&self) -> Result<Vec<Box<dyn AppenderAccessor>>> {
        let logger_name = self.name()?;
        let attached = self.logger.call_list("getAllAppenders")?;
        Ok(objects(attached)
            .into_iter()
            .map(|appender| {
                Box::new(Log4jAppender::new(
                    self.logger.rebind(appender),
                    logger_name.clone(),
                )) as Box<dyn AppenderAccessor>
            })
            .collect())
    }

    fn parent(&self) -> Result<Option<Box<dyn LoggerAccessor>>> {
        Ok(self.logger.call_object("getParent")?.map(|parent| {
            Box::new(Log4jLogger {
                logger: self.logger.rebind(parent),
            }) as Box<dyn LoggerAccessor>
        }))
    }

    fn can_set_level(&self) -> bool {
        self.logger
            .has_capability("setLevel", &[ValueKind::Object(LEVEL_CLASS.to_string())])
    }

    fn set_level(&self, level: Level) -> Result<()> {
        let name = self.name()?;
        if !self.can_set_level() {
            return Err(ProbeError::Unsupported(format!(
                "log4j logger {} has no setLevel",
                name
            )));
        }
        let foreign = match level {
            Level::Inherit if name == ROOT_LOGGER_NAME => {
                return Err(ProbeError::Unsupported(
                    "the log4j root logger cannot inherit a level".to_string(),
                ))
            }
            Level::Inherit => None,
            Level::Unknown => {
                return Err(ProbeError::Unsupported("cannot assign UNKNOWN".to_string()))
            }
            other => Some(other.as_str()),
        };
        assign_level(&self.logger, LEVEL_CLASS, "toLevel", foreign)?;
        info!("{}: log4j logger {} set to {}", self.application(), name, level);
        Ok(())
    }

    fn max_hierarchy_depth(&self) -> usize {
        self.logger.policy().max_hierarchy_depth
    }
}

#[derive(Debug)]
struct Log4jAppender {
    appender: CapabilityAccessor,
    logger_name: String,
    kind: AppenderKind,
}

impl Log4jAppender {
    fn new(appender: CapabilityAccessor, logger_name: String) -> Self {
        let kind = if appender.is_instance_of(FILE_APPENDER_CLASS) {
            AppenderKind::File
        } else if appender.is_instance_of(CONSOLE_APPENDER_CLASS) {
            AppenderKind::Console
        } else {
            AppenderKind::Other
        };
        Self {
            appender,
            logger_name,
            kind,
        }
    }
}

impl AppenderAccessor for Log4jAppender {
    fn framework(&self) -> FrameworkKind {
        KIND
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
        self.kind
    }

    fn file(&self) -> Result<Option<PathBuf>> {
        if self.kind != AppenderKind::File {
            return Ok(None);
        }
        match self.appender.call_string("getFile")? {
            Some(raw) if !raw.is_empty() => {
                Ok(Some(self.appender.application().resolve_path(raw)))
            }
            _ => {
                warn!(
                    "{}: file appender on {} has no file configured",
                    self.application(),
                    self.logger_name
                );
                Ok(None)
            }
        }
    }
}

fn level_from_log4j(name: &str) -> Level {
    match name {
        "OFF" => Level::Off,
        "FATAL" => Level::Fatal,
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
    use crate::foreign::{DynamicContext, ForeignValue};
    use parking_lot::Mutex;

    fn shop() -> ApplicationDescription {
        toml::from_str(
            r#"
            name = "shop"
            work_dir = "/apps/shop"
            framework = "log4j"

            [[loggers]]
            name = "root"
            level = "INFO"
            appenders = ["file", "console"]

            [[loggers]]
            name = "com.shop.orders"
            level = "DEBUG"
            appenders = ["file"]

            [[loggers]]
            name = "com.shop.orders.audit"

            [[appenders]]
            name = "file"
            kind = "file"
            file = "logs/shop.log"

            [[appenders]]
            name = "console"
            kind = "console"
            "#,
        )
        .unwrap()
    }

    fn factory() -> (Arc<DynamicContext>, Box<dyn FactoryAccessor>) {
        let ctx = build_context(&shop());
        let app = OwningApplication::new("shop", "/apps/shop", ctx.clone());
        let factory = Log4jAdapter.build(&app, CallPolicy::inline()).unwrap();
        (ctx, factory)
    }

    #[test]
    fn test_root_logger() {
        let (_ctx, factory) = factory();
        let root = factory.root_logger().unwrap().unwrap();
        assert_eq!(root.name().unwrap(), ROOT_LOGGER_NAME);
        assert_eq!(root.level().unwrap(), Level::Info);
        assert!(root.parent().unwrap().is_none());

        let appenders = root.appenders().unwrap();
        assert_eq!(appenders.len(), 2);
        assert_eq!(appenders[0].kind(), AppenderKind::File);
        assert_eq!(
            appenders[0].file().unwrap(),
            Some(PathBuf::from("/apps/shop/logs/shop.log"))
        );
        assert_eq!(appenders[1].kind(), AppenderKind::Console);
        assert_eq!(appenders[1].file().unwrap(), None);
    }

    #[test]
    fn test_hierarchy_and_effective_level() {
        let (_ctx, factory) = factory();
        let audit = factory.logger("com.shop.orders.audit").unwrap().unwrap();
        assert_eq!(audit.level().unwrap(), Level::Inherit);
        assert_eq!(audit.effective_level().unwrap(), Level::Debug);

        let ancestors = audit.ancestors().unwrap();
        let names: Vec<String> = ancestors.iter().map(|l| l.name().unwrap()).collect();
        assert_eq!(names, vec!["com.shop.orders", "root"]);
    }

    #[test]
    fn test_missing_logger_is_none() {
        let (_ctx, factory) = factory();
        assert!(factory.logger("nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_appenders_deduplicated() {
        let (_ctx, factory) = factory();
        let appenders = factory.appenders().unwrap();
        let names: Vec<String> = appenders.iter().map(|a| a.name().unwrap()).collect();
        assert_eq!(names, vec!["file", "console"]);
    }

    #[test]
    fn test_set_level_round_trip() {
        let (_ctx, factory) = factory();
        let orders = factory.logger("com.shop.orders").unwrap().unwrap();
        assert!(orders.can_set_level());
        for level in Level::ASSIGNABLE {
            orders.set_level(level).unwrap();
            assert_eq!(orders.level().unwrap(), level);
        }

        let root = factory.root_logger().unwrap().unwrap();
        assert!(matches!(
            root.set_level(Level::Inherit),
            Err(ProbeError::Unsupported(_))
        ));
        assert_eq!(root.level().unwrap(), Level::Info);
    }

    #[test]
    fn test_does_not_apply_without_log4j() {
        let ctx = DynamicContext::new("bare");
        let app = OwningApplication::new("bare", "/apps/bare", ctx);
        assert!(!Log4jAdapter.can_handle(&app, CallPolicy::inline()));
    }

    #[test]
    fn test_does_not_apply_when_root_has_wrong_type() {
        let ctx = DynamicContext::new("odd");
        let impostor = ctx.object("org.example.NotALogger").build();
        ctx.define_class(
            LOG_MANAGER_CLASS,
            ctx.statics().constant("getRootLogger", impostor),
        );
        ctx.define_class(LOGGER_CLASS, ctx.statics());
        let app = OwningApplication::new("odd", "/apps/odd", ctx);

        assert!(!Log4jAdapter.can_handle(&app, CallPolicy::inline()));
        assert!(matches!(
            Log4jAdapter.build(&app, CallPolicy::inline()),
            Err(ProbeError::AdapterMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_level_and_missing_setter() {
        let ctx = DynamicContext::new("odd");
        let custom = ctx.object(LEVEL_CLASS).constant("toString", "NOTICE").build();
        let root = ctx
            .object(LOGGER_CLASS)
            .constant("getName", "root")
            .constant("getLevel", custom)
            .constant("getParent", ForeignValue::Null)
            .build();
        ctx.define_class(LOG_MANAGER_CLASS, ctx.statics().constant("getRootLogger", root));
        ctx.define_class(LOGGER_CLASS, ctx.statics());
        let app = OwningApplication::new("odd", "/apps/odd", ctx);

        let factory = Log4jAdapter.build(&app, CallPolicy::inline()).unwrap();
        let root = factory.root_logger().unwrap().unwrap();
        assert_eq!(root.level().unwrap(), Level::Unknown);
        assert!(!root.can_set_level());
        assert!(matches!(
            root.set_level(Level::Debug),
            Err(ProbeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_cyclic_parent_is_bounded() {
        let ctx = DynamicContext::new("loop");
        let slot: Arc<Mutex<Option<ObjectRef>>> = Arc::new(Mutex::new(None));
        let parent = slot.clone();
        let looping = ctx
            .object(LOGGER_CLASS)
            .constant("getName", "com.loop")
            .constant("getLevel", ForeignValue::Null)
            .constant("getAllAppenders", ForeignValue::List(Vec::new()))
            .method("getParent", vec![], move |_| Ok(parent.lock().clone().into()))
            .build();
        *slot.lock() = Some(looping.clone());
        ctx.define_class(
            LOG_MANAGER_CLASS,
            ctx.statics()
                .constant("getRootLogger", looping.clone())
                .method("exists", vec![ValueKind::Str], move |_| Ok(looping.clone().into())),
        );
        ctx.define_class(LOGGER_CLASS, ctx.statics());
        let app = OwningApplication::new("loop", "/apps/loop", ctx);

        let factory = Log4jAdapter.build(&app, CallPolicy::inline()).unwrap();
        let logger = factory.logger("com.loop").unwrap().unwrap();
        let limit = CallPolicy::inline().max_hierarchy_depth;
        assert!(matches!(
            logger.ancestors(),
            Err(ProbeError::HierarchyTooDeep(n)) if n == limit
        ));
        assert!(matches!(
            logger.effective_level(),
            Err(ProbeError::HierarchyTooDeep(_))
        ));
    }
}
