//! Emulated hosted applications.
//!
//! A [`HostDescription`] lists applications and the logging configuration
//! each one runs with. [`build_host`] turns it into a [`DynamicHost`] whose
//! contexts carry the same class names, method names and object graphs as
//! the real frameworks, so the adapters cannot tell the difference.

mod jdk;
mod log4j;
mod logback;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::accessor::{AppenderKind, FrameworkKind, ROOT_LOGGER_NAME};
use crate::error::{ProbeError, Result};
use crate::foreign::{
    ContextId, DynamicContext, DynamicHost, DynamicObjectBuilder, ForeignValue, IsolatedContext,
    Liveness, ObjectRef, TypeInfo, ValueKind,
};

/// All applications of an emulated host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostDescription {
    #[serde(default)]
    pub applications: Vec<ApplicationDescription>,
}

/// One hosted application and its logging setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationDescription {
    pub name: String,

    /// Working directory of the application.
    pub work_dir: PathBuf,

    /// Framework loaded inside the application, if any.
    #[serde(default)]
    pub framework: Option<FrameworkKind>,

    /// Stopped applications are deployed without a context.
    #[serde(default = "default_running")]
    pub running: bool,

    #[serde(default)]
    pub loggers: Vec<LoggerDescription>,

    #[serde(default)]
    pub appenders: Vec<AppenderDescription>,
}

fn default_running() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerDescription {
    /// Logger name; `root` is the root logger of every framework.
    pub name: String,

    /// Level in the framework's own vocabulary; absent means inherit.
    #[serde(default)]
    pub level: Option<String>,

    /// Names of attached appenders, in order.
    #[serde(default)]
    pub appenders: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppenderDescription {
    pub name: String,

    pub kind: AppenderKind,

    /// File of a file appender; relative paths are relative to the work dir.
    #[serde(default)]
    pub file: Option<String>,

    /// Directory, prefix and suffix of a JULI file handler.
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
}

impl HostDescription {
    /// Load a description from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ProbeError::Config(format!(
                "Failed to read host description {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let description: Self = toml::from_str(content).map_err(|e| {
            ProbeError::Config(format!("Failed to parse host description: {}", e))
        })?;
        description.validate()?;
        Ok(description)
    }

    /// Check names are unique and appender references resolve.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for app in &self.applications {
            if app.name.is_empty() {
                return Err(ProbeError::Config("Application name cannot be empty".into()));
            }
            if !names.insert(app.name.as_str()) {
                return Err(ProbeError::Config(format!(
                    "Application {} is listed twice",
                    app.name
                )));
            }
            app.validate()?;
        }
        Ok(())
    }
}

impl ApplicationDescription {
    pub fn validate(&self) -> Result<()> {
        let appenders: HashSet<&str> = self.appenders.iter().map(|a| a.name.as_str()).collect();
        for logger in &self.loggers {
            for reference in &logger.appenders {
                if !appenders.contains(reference.as_str()) {
                    return Err(ProbeError::Config(format!(
                        "{}: logger {} references unknown appender {}",
                        self.name, logger.name, reference
                    )));
                }
            }
        }
        if self.framework.is_none() && !self.loggers.is_empty() {
            return Err(ProbeError::Config(format!(
                "{}: loggers are configured but no framework is set",
                self.name
            )));
        }
        Ok(())
    }
}

/// Build a context for one application with its framework installed.
pub fn build_context(app: &ApplicationDescription) -> Arc<DynamicContext> {
    let ctx = DynamicContext::new(app.name.clone());
    match app.framework {
        Some(FrameworkKind::Jdk) => jdk::install(&ctx, app),
        Some(FrameworkKind::Log4j) => log4j::install(&ctx, app),
        Some(FrameworkKind::Logback) => logback::install(&ctx, app, ""),
        Some(FrameworkKind::TomcatLogback) => {
            logback::install(&ctx, app, crate::adapters::TOMCAT_PREFIX)
        }
        None => debug!("{}: no logging framework installed", app.name),
    }
    ctx
}

/// Build a host with every described application deployed.
pub fn build_host(description: &HostDescription) -> Result<DynamicHost> {
    description.validate()?;
    let host = DynamicHost::new();
    for app in &description.applications {
        let context = app.running.then(|| build_context(app));
        host.deploy(app.name.clone(), app.work_dir.clone(), context);
    }
    Ok(host)
}

/// Creates objects typed by one context.
#[derive(Debug, Clone)]
pub(crate) struct Forge {
    id: ContextId,
    liveness: Liveness,
}

impl Forge {
    pub(crate) fn new(ctx: &DynamicContext) -> Self {
        Self {
            id: ctx.id(),
            liveness: ctx.liveness(),
        }
    }

    pub(crate) fn object(&self, type_name: &str) -> DynamicObjectBuilder {
        DynamicObjectBuilder::new(TypeInfo::new(type_name, self.id), self.liveness.clone())
    }

    pub(crate) fn level(&self, class: &str, name_method: &str, name: &str) -> ObjectRef {
        self.object(class)
            .constant(name_method, name.to_uppercase())
            .build()
    }
}

/// Loggers of one framework instance, keyed by their foreign name.
#[derive(Debug, Clone, Default)]
pub(crate) struct Registry(Arc<RwLock<BTreeMap<String, ObjectRef>>>);

impl Registry {
    pub(crate) fn insert(&self, name: &str, logger: ObjectRef) {
        self.0.write().insert(name.to_string(), logger);
    }

    pub(crate) fn get(&self, name: &str) -> Option<ObjectRef> {
        self.0.read().get(name).cloned()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }

    pub(crate) fn all(&self) -> Vec<ObjectRef> {
        self.0.read().values().cloned().collect()
    }

    pub(crate) fn all_except(&self, excluded: &str) -> Vec<ObjectRef> {
        self.0
            .read()
            .iter()
            .filter(|(name, _)| name.as_str() != excluded)
            .map(|(_, logger)| logger.clone())
            .collect()
    }

    fn downgrade(&self) -> Weak<RwLock<BTreeMap<String, ObjectRef>>> {
        Arc::downgrade(&self.0)
    }
}

/// A string value, or null when absent.
pub(crate) fn optional_str(value: &Option<String>) -> ForeignValue {
    value.clone().map(ForeignValue::from).unwrap_or(ForeignValue::Null)
}

/// Nearest registered ancestor by dotted name, falling back to the root.
fn nearest_ancestor(
    loggers: &BTreeMap<String, ObjectRef>,
    name: &str,
    root_key: &str,
) -> Option<ObjectRef> {
    if name == root_key {
        return None;
    }
    let mut current = name;
    while let Some(i) = current.rfind('.') {
        current = &current[..i];
        if let Some(found) = loggers.get(current) {
            return Some(found.clone());
        }
    }
    loggers.get(root_key).cloned()
}

/// How one framework's logger objects look.
#[derive(Debug, Clone)]
pub(crate) struct LoggerShape {
    pub type_name: String,
    pub supertypes: Vec<String>,
    pub level_class: String,
    pub appenders_method: &'static str,
    pub parent_method: Option<&'static str>,
    pub root_key: &'static str,
}

impl LoggerShape {
    /// Build a logger object and register it.
    pub(crate) fn build(
        &self,
        forge: &Forge,
        registry: &Registry,
        foreign_name: &str,
        level: Option<ObjectRef>,
        appenders: Vec<ObjectRef>,
    ) -> ObjectRef {
        let state = Arc::new(Mutex::new(level));
        let read = state.clone();
        let attached: Vec<ForeignValue> = appenders.into_iter().map(ForeignValue::Object).collect();

        let mut builder = forge
            .object(&self.type_name)
            .extends(self.supertypes.clone())
            .constant("getName", foreign_name)
            .method("getLevel", vec![], move |_| Ok(read.lock().clone().into()))
            .method(
                "setLevel",
                vec![ValueKind::Object(self.level_class.clone())],
                move |args| {
                    *state.lock() = args[0].as_object().cloned();
                    Ok(ForeignValue::Null)
                },
            )
            .constant(self.appenders_method, ForeignValue::List(attached));

        if let Some(parent_method) = self.parent_method {
            let loggers = registry.downgrade();
            let own = foreign_name.to_string();
            let root_key = self.root_key;
            builder = builder.method(parent_method, vec![], move |_| {
                let parent = loggers
                    .upgrade()
                    .and_then(|map| nearest_ancestor(&map.read(), &own, root_key));
                Ok(parent.into())
            });
        }

        let logger = builder.build();
        registry.insert(foreign_name, logger.clone());
        logger
    }
}

/// Build every described logger, root first; a root is added if missing.
pub(crate) fn build_loggers(
    app: &ApplicationDescription,
    shape: &LoggerShape,
    forge: &Forge,
    registry: &Registry,
    appenders: &BTreeMap<String, ObjectRef>,
    level_of: &dyn Fn(&str) -> ObjectRef,
    default_root_level: &str,
) {
    let mut described: Vec<&LoggerDescription> = app.loggers.iter().collect();
    described.sort_by_key(|l| l.name != ROOT_LOGGER_NAME);

    if described.first().map(|l| l.name != ROOT_LOGGER_NAME).unwrap_or(true) {
        shape.build(
            forge,
            registry,
            shape.root_key,
            Some(level_of(default_root_level)),
            Vec::new(),
        );
    }

    for logger in described {
        let attached = logger
            .appenders
            .iter()
            .filter_map(|name| {
                let found = appenders.get(name).cloned();
                if found.is_none() {
                    warn!("{}: unknown appender {} skipped", app.name, name);
                }
                found
            })
            .collect();
        let foreign_name = if logger.name == ROOT_LOGGER_NAME {
            shape.root_key
        } else {
            logger.name.as_str()
        };
        let level = match (&logger.level, foreign_name == shape.root_key) {
            (Some(level), _) => Some(level_of(level)),
            (None, true) => Some(level_of(default_root_level)),
            (None, false) => None,
        };
        shape.build(forge, registry, foreign_name, level, attached);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign::HostRuntime;

    const HOST: &str = r#"
        [[applications]]
        name = "shop"
        work_dir = "/apps/shop"
        framework = "log4j"

        [[applications.loggers]]
        name = "root"
        level = "INFO"
        appenders = ["file"]

        [[applications.appenders]]
        name = "file"
        kind = "file"
        file = "logs/app.log"

        [[applications]]
        name = "static"
        work_dir = "/apps/static"

        [[applications]]
        name = "archived"
        work_dir = "/apps/archived"
        running = false
    "#;

    #[test]
    fn test_build_host() {
        let description = HostDescription::from_toml_str(HOST).unwrap();
        let host = build_host(&description).unwrap();

        let apps = host.applications();
        assert_eq!(apps.len(), 3);
        let shop = host.find_application("shop").unwrap();
        let ctx = shop.live_context().unwrap();
        assert!(ctx.load_class("org.apache.log4j.LogManager").is_some());

        let bare = host.find_application("static").unwrap();
        let ctx = bare.live_context().unwrap();
        assert!(ctx.load_class("org.apache.log4j.LogManager").is_none());

        assert!(host.find_application("archived").unwrap().context.is_none());
    }

    #[test]
    fn test_unknown_appender_reference_rejected() {
        let content = r#"
            [[applications]]
            name = "shop"
            work_dir = "/apps/shop"
            framework = "log4j"

            [[applications.loggers]]
            name = "root"
            appenders = ["missing"]
        "#;
        assert!(matches!(
            HostDescription::from_toml_str(content),
            Err(ProbeError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_application_rejected() {
        let content = r#"
            [[applications]]
            name = "shop"
            work_dir = "/a"

            [[applications]]
            name = "shop"
            work_dir = "/b"
        "#;
        assert!(HostDescription::from_toml_str(content).is_err());
    }

    #[test]
    fn test_nearest_ancestor() {
        let ctx = DynamicContext::new("x");
        let forge = Forge::new(&ctx);
        let mut loggers = BTreeMap::new();
        loggers.insert("root".to_string(), forge.object("L").build());
        loggers.insert("a".to_string(), forge.object("L").build());

        let parent = nearest_ancestor(&loggers, "a.b.c", "root").unwrap();
        assert!(parent.same_object(&loggers["a"]));
        let parent = nearest_ancestor(&loggers, "z", "root").unwrap();
        assert!(parent.same_object(&loggers["root"]));
        assert!(nearest_ancestor(&loggers, "root", "root").is_none());
    }
}
