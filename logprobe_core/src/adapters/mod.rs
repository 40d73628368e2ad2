//! Framework adapters.
//!
//! One adapter per supported logging framework shape. Each knows the class
//! and method names of its framework, decides whether it applies to a
//! context, and wraps the framework's objects in the uniform accessors.

pub(crate) mod jdk;
pub(crate) mod log4j;
pub(crate) mod logback;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::accessor::{
    CallPolicy, CapabilityAccessor, FactoryAccessor, FrameworkKind, InvokeError, Level,
    OwningApplication, ROOT_LOGGER_NAME,
};
use crate::error::{ProbeError, Result};
use crate::foreign::{ForeignValue, ObjectRef, ValueKind};

pub use jdk::JdkAdapter;
pub use log4j::Log4jAdapter;
pub use logback::{LogbackAdapter, TOMCAT_PREFIX};

/// Priority order used when none is configured.
pub const DEFAULT_ADAPTER_ORDER: [FrameworkKind; 4] = [
    FrameworkKind::Log4j,
    FrameworkKind::Logback,
    FrameworkKind::TomcatLogback,
    FrameworkKind::Jdk,
];

/// A logging framework shape.
pub trait FrameworkAdapter: Send + Sync + fmt::Debug {
    fn kind(&self) -> FrameworkKind;

    /// Find the framework's factory object inside the application's context.
    ///
    /// Every failure is reported as [`ProbeError::AdapterMismatch`].
    fn locate(&self, app: &Arc<OwningApplication>, policy: CallPolicy)
        -> Result<CapabilityAccessor>;

    /// Wrap a located factory object.
    fn wrap(&self, factory: CapabilityAccessor) -> Box<dyn FactoryAccessor>;

    /// Whether this adapter applies. Never fails.
    fn can_handle(&self, app: &Arc<OwningApplication>, policy: CallPolicy) -> bool {
        match self.locate(app, policy) {
            Ok(_) => true,
            Err(e) => {
                debug!("{} adapter does not apply to {}: {}", self.kind(), app.name(), e);
                false
            }
        }
    }

    /// Build the factory accessor for an application.
    fn build(
        &self,
        app: &Arc<OwningApplication>,
        policy: CallPolicy,
    ) -> Result<Box<dyn FactoryAccessor>> {
        self.locate(app, policy).map(|factory| self.wrap(factory))
    }
}

/// The adapter for one framework kind.
pub fn adapter_for(kind: FrameworkKind) -> Box<dyn FrameworkAdapter> {
    match kind {
        FrameworkKind::Jdk => Box::new(JdkAdapter),
        FrameworkKind::Log4j => Box::new(Log4jAdapter),
        FrameworkKind::Logback => Box::new(LogbackAdapter::standard()),
        FrameworkKind::TomcatLogback => Box::new(LogbackAdapter::tomcat()),
    }
}

/// Adapters in the given priority order, duplicates dropped.
pub fn adapters_in_order(order: &[FrameworkKind]) -> Vec<Box<dyn FrameworkAdapter>> {
    let mut adapters: Vec<Box<dyn FrameworkAdapter>> = Vec::new();
    for kind in order {
        if adapters.iter().all(|a| a.kind() != *kind) {
            adapters.push(adapter_for(*kind));
        }
    }
    adapters
}

pub(crate) fn mismatch(kind: FrameworkKind, detail: impl fmt::Display) -> ProbeError {
    ProbeError::AdapterMismatch(format!("{}: {}", kind, detail))
}

/// Bind the static side of `class_name` as loaded by the application's context.
pub(crate) fn bind_class(
    kind: FrameworkKind,
    app: &Arc<OwningApplication>,
    policy: CallPolicy,
    class_name: &str,
) -> Result<CapabilityAccessor> {
    let class = app
        .context()
        .load_class(class_name)
        .ok_or_else(|| mismatch(kind, format!("{} is not loadable", class_name)))?;
    Ok(CapabilityAccessor::bind(
        class.statics().clone(),
        app.clone(),
        policy,
    ))
}

/// Map a framework's raw logger name to the canonical one.
pub(crate) fn normalize_name(raw: Option<String>, reserved_root: &[&str]) -> String {
    match raw {
        Some(name) if !reserved_root.contains(&name.as_str()) => name,
        _ => ROOT_LOGGER_NAME.to_string(),
    }
}

/// Objects of a returned list; non-object entries are dropped.
pub(crate) fn objects(items: Vec<ForeignValue>) -> Vec<ObjectRef> {
    items.into_iter().filter_map(ForeignValue::into_object).collect()
}

/// Read a logger's level through its level object.
pub(crate) fn read_level(
    logger: &CapabilityAccessor,
    name_method: &str,
    map: fn(&str) -> Level,
) -> Result<Level> {
    match logger.call_object("getLevel")? {
        None => Ok(Level::Inherit),
        Some(level) => {
            let name = logger.rebind(level).call_string(name_method)?;
            Ok(name.as_deref().map(map).unwrap_or(Level::Unknown))
        }
    }
}

/// Assign a level by parsing its foreign name with a static factory method.
///
/// `None` clears the level so the logger inherits.
pub(crate) fn assign_level(
    logger: &CapabilityAccessor,
    level_class: &str,
    parse_method: &str,
    foreign_name: Option<&str>,
) -> Result<()> {
    let value = match foreign_name {
        Some(name) => {
            let class = logger.load_class(level_class).ok_or_else(|| {
                ProbeError::ForeignLookup(format!("{} is not loadable", level_class))
            })?;
            let level =
                logger.invoke_static(&class, parse_method, &[ValueKind::Str], vec![name.into()])?;
            if level.is_null() {
                return Err(ProbeError::ForeignLookup(format!(
                    "{}.{}(\"{}\") returned null",
                    level_class, parse_method, name
                )));
            }
            level
        }
        None => ForeignValue::Null,
    };
    logger
        .invoke(
            "setLevel",
            &[ValueKind::Object(level_class.to_string())],
            vec![value],
        )
        .map_err(|e| match e {
            InvokeError::NotFound { .. } | InvokeError::Mismatch { .. } => {
                ProbeError::Unsupported(e.to_string())
            }
            other => other.into(),
        })?;
    Ok(())
}
