//! Log destination resolution.
//!
//! A request names an application and a logical log. The resolver finds the
//! application's running context, picks the first adapter that applies, walks
//! the framework's loggers and appenders to a file, and falls back to the
//! configured naming conventions when no framework reports one. Nothing is
//! cached: every request builds fresh accessors, so a redeployed application
//! is picked up on the next call.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::accessor::{
    AppenderAccessor, AppenderInfo, CallPolicy, FactoryAccessor, FrameworkKind, Level,
    LoggerAccessor, LoggerInfo, OwningApplication,
};
use crate::adapters::{adapter_for, adapters_in_order, FrameworkAdapter};
use crate::config::ProbeConfig;
use crate::error::{ProbeError, Result};
use crate::foreign::HostRuntime;

/// Which log of an application is wanted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "name")]
pub enum LogTarget {
    /// The framework's root logger.
    Root,

    /// A named framework logger.
    Logger(String),

    /// The server console output.
    Console,

    /// The request access log.
    Access,
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root logger"),
            Self::Logger(name) => write!(f, "logger {}", name),
            Self::Console => f.write_str("console log"),
            Self::Access => f.write_str("access log"),
        }
    }
}

/// A logical log request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSpec {
    pub application: String,

    /// Use this framework instead of the first one that applies.
    #[serde(default)]
    pub framework: Option<FrameworkKind>,

    pub target: LogTarget,

    /// Pick this appender of the logger instead of the first file-backed one.
    #[serde(default)]
    pub appender: Option<String>,
}

impl LogSpec {
    pub fn new(application: impl Into<String>, target: LogTarget) -> Self {
        Self {
            application: application.into(),
            framework: None,
            target,
            appender: None,
        }
    }

    pub fn root(application: impl Into<String>) -> Self {
        Self::new(application, LogTarget::Root)
    }

    pub fn logger(application: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(application, LogTarget::Logger(name.into()))
    }

    pub fn with_framework(mut self, framework: FrameworkKind) -> Self {
        self.framework = Some(framework);
        self
    }

    pub fn with_appender(mut self, appender: impl Into<String>) -> Self {
        self.appender = Some(appender.into());
        self
    }
}

/// Where a destination's file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationSource {
    /// Reported by a framework appender.
    Appender,

    /// Derived from the naming conventions.
    Convention,
}

/// A resolved log file, with live accessors when a framework reported it.
#[derive(Debug)]
pub struct Destination {
    application: String,
    file: PathBuf,
    exists: bool,
    size: Option<u64>,
    last_modified: Option<DateTime<Utc>>,
    source: DestinationSource,
    framework: Option<FrameworkKind>,
    logger_name: Option<String>,
    appender_name: Option<String>,
    logger: Option<Box<dyn LoggerAccessor>>,
    appender: Option<Box<dyn AppenderAccessor>>,
}

impl Destination {
    fn stat(application: &str, file: PathBuf, source: DestinationSource) -> Self {
        let (exists, size, last_modified) = match fs::metadata(&file) {
            Ok(meta) => (
                true,
                Some(meta.len()),
                meta.modified().ok().map(DateTime::<Utc>::from),
            ),
            Err(_) => (false, None, None),
        };
        Self {
            application: application.to_string(),
            file,
            exists,
            size,
            last_modified,
            source,
            framework: None,
            logger_name: None,
            appender_name: None,
            logger: None,
            appender: None,
        }
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Whether the file exists right now. A missing file is a valid result.
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn source(&self) -> DestinationSource {
        self.source
    }

    pub fn framework(&self) -> Option<FrameworkKind> {
        self.framework
    }

    /// The logger the file was reached through, for level changes.
    pub fn logger(&self) -> Option<&dyn LoggerAccessor> {
        self.logger.as_deref()
    }

    /// The appender that reported the file.
    pub fn appender(&self) -> Option<&dyn AppenderAccessor> {
        self.appender.as_deref()
    }

    pub fn summary(&self) -> DestinationSummary {
        DestinationSummary {
            application: self.application.clone(),
            file: self.file.clone(),
            exists: self.exists,
            size: self.size,
            last_modified: self.last_modified,
            source: self.source,
            framework: self.framework,
            logger: self.logger_name.clone(),
            appender: self.appender_name.clone(),
        }
    }
}

/// A [`Destination`] without its live accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationSummary {
    pub application: String,
    pub file: PathBuf,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    pub source: DestinationSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<FrameworkKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appender: Option<String>,
}

/// Appenders of one application, or why they could not be listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationReport {
    pub application: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<FrameworkKind>,
    pub appenders: Vec<AppenderInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolves logical logs of hosted applications to files.
pub struct LogResolver {
    host: Arc<dyn HostRuntime>,
    config: ProbeConfig,
    policy: CallPolicy,
    adapters: Vec<Box<dyn FrameworkAdapter>>,
}

impl fmt::Debug for LogResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogResolver")
            .field("policy", &self.policy)
            .field("adapters", &self.adapters)
            .finish()
    }
}

impl LogResolver {
    pub fn new(host: Arc<dyn HostRuntime>, config: ProbeConfig) -> Self {
        let adapters = adapters_in_order(&config.resolver.adapter_order);
        let policy = config.call_policy();
        debug!(
            "Resolver ready with adapters {:?}",
            adapters.iter().map(|a| a.kind()).collect::<Vec<_>>()
        );
        Self {
            host,
            config,
            policy,
            adapters,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Names of every deployed application, running or not.
    pub fn application_names(&self) -> Vec<String> {
        self.host
            .applications()
            .into_iter()
            .map(|app| app.name)
            .collect()
    }

    /// The running application called `name`.
    fn application(&self, name: &str) -> Result<Arc<OwningApplication>> {
        let hosted = self
            .host
            .find_application(name)
            .ok_or_else(|| ProbeError::NotFound(format!("application {}", name)))?;
        OwningApplication::from_hosted(&hosted)
            .ok_or_else(|| ProbeError::NotFound(format!("application {} is not running", name)))
    }

    /// The factory of the first adapter, in priority order, that applies to
    /// the application. Each adapter probes the context once.
    pub fn select_factory(
        &self,
        app: &Arc<OwningApplication>,
    ) -> Option<Box<dyn FactoryAccessor>> {
        let factory = self
            .adapters
            .iter()
            .find_map(|adapter| match adapter.build(app, self.policy) {
                Ok(factory) => Some(factory),
                Err(e) => {
                    debug!(
                        "{} adapter does not apply to {}: {}",
                        adapter.kind(),
                        app.name(),
                        e
                    );
                    None
                }
            });
        match &factory {
            Some(factory) => debug!("{}: using the {} adapter", app.name(), factory.framework()),
            None => debug!("{}: no logging framework recognized", app.name()),
        }
        factory
    }

    /// The factory accessor of the application's framework.
    ///
    /// Returns `None` when no adapter applies. An explicitly requested
    /// framework that is not present is `NotFound`.
    pub fn factory_for(
        &self,
        app: &Arc<OwningApplication>,
        framework: Option<FrameworkKind>,
    ) -> Result<Option<Box<dyn FactoryAccessor>>> {
        match framework {
            Some(kind) => adapter_for(kind)
                .build(app, self.policy)
                .map(Some)
                .map_err(|e| match e {
                    ProbeError::AdapterMismatch(detail) => ProbeError::NotFound(format!(
                        "{} logging in {}: {}",
                        kind,
                        app.name(),
                        detail
                    )),
                    other => other,
                }),
            None => Ok(self.select_factory(app)),
        }
    }

    /// Resolve a logical log to a file.
    ///
    /// Fails with `NotFound` for an unknown or stopped application and for a
    /// logger or appender the framework does not know. A file that does not
    /// exist yet is still a destination.
    pub fn resolve_destination(&self, spec: &LogSpec) -> Result<Destination> {
        let result = self.resolve(spec);
        if let Err(e) = &result {
            report_failure(&spec.application, e);
        }
        result
    }

    fn resolve(&self, spec: &LogSpec) -> Result<Destination> {
        let app = self.application(&spec.application)?;
        let conventions = &self.config.conventions;
        let logger_name = match &spec.target {
            LogTarget::Console => return Ok(self.by_convention(&app, &conventions.console_log)),
            LogTarget::Access => return Ok(self.by_convention(&app, &conventions.access_log)),
            LogTarget::Root => None,
            LogTarget::Logger(name) => Some(name.as_str()),
        };

        let Some(factory) = self.factory_for(&app, spec.framework)? else {
            info!(
                "{}: no logging framework, using the conventional log file",
                app.name()
            );
            return Ok(self.by_convention(&app, &conventions.default_log));
        };

        let logger = match logger_name {
            None => factory.root_logger()?,
            Some(name) => factory.logger(name)?,
        };
        let Some(logger) = logger else {
            warn!("{}: {} not found", app.name(), spec.target);
            return Err(ProbeError::NotFound(format!(
                "{} in {}",
                spec.target,
                app.name()
            )));
        };

        match self.file_appender(logger.as_ref(), spec.appender.as_deref())? {
            Some((appender, file)) => {
                let mut destination =
                    Destination::stat(app.name(), file, DestinationSource::Appender);
                destination.framework = Some(factory.framework());
                destination.logger_name = Some(logger.name()?);
                destination.appender_name = Some(appender.name()?);
                destination.logger = Some(logger);
                destination.appender = Some(appender);
                Ok(destination)
            }
            None => {
                debug!(
                    "{}: {} has no file appender, using the conventional log file",
                    app.name(),
                    spec.target
                );
                let mut destination = self.by_convention(&app, &conventions.default_log);
                destination.framework = Some(factory.framework());
                destination.logger_name = Some(logger.name()?);
                destination.logger = Some(logger);
                Ok(destination)
            }
        }
    }

    /// The first file-backed appender of the logger, else of its nearest
    /// ancestor that has one. A requested appender is only looked for on the
    /// logger itself.
    fn file_appender(
        &self,
        logger: &dyn LoggerAccessor,
        wanted: Option<&str>,
    ) -> Result<Option<(Box<dyn AppenderAccessor>, PathBuf)>> {
        if let Some(wanted) = wanted {
            for appender in logger.appenders()? {
                if appender.name()? == wanted {
                    return Ok(appender.file()?.map(|file| (appender, file)));
                }
            }
            return Err(ProbeError::NotFound(format!(
                "appender {} on logger {}",
                wanted,
                logger.name()?
            )));
        }

        if let Some(found) = first_file(logger)? {
            return Ok(Some(found));
        }
        for ancestor in logger.ancestors()? {
            if let Some(found) = first_file(ancestor.as_ref())? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn by_convention(&self, app: &OwningApplication, relative: &Path) -> Destination {
        Destination::stat(
            app.name(),
            app.resolve_path(relative),
            DestinationSource::Convention,
        )
    }

    /// Every appender of the application's framework, each foreign object once.
    ///
    /// An appender that cannot be described is skipped with a warning.
    pub fn list_appenders(&self, application: &str) -> Result<Vec<AppenderInfo>> {
        self.appenders_of(application).map(|(_, appenders)| appenders)
    }

    fn appenders_of(
        &self,
        application: &str,
    ) -> Result<(Option<FrameworkKind>, Vec<AppenderInfo>)> {
        let app = self.application(application)?;
        let Some(factory) = self.factory_for(&app, None)? else {
            return Ok((None, Vec::new()));
        };
        let infos = factory
            .appenders()?
            .iter()
            .filter_map(|appender| match appender.info() {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!("{}: skipping an appender: {}", application, e);
                    None
                }
            })
            .collect();
        Ok((Some(factory.framework()), infos))
    }

    /// Every logger the application's framework knows.
    pub fn list_loggers(&self, application: &str) -> Result<Vec<LoggerInfo>> {
        let app = self.application(application)?;
        let Some(factory) = self.factory_for(&app, None)? else {
            return Ok(Vec::new());
        };
        Ok(factory
            .loggers()?
            .iter()
            .filter_map(|logger| match logger.info() {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!("{}: skipping a logger: {}", application, e);
                    None
                }
            })
            .collect())
    }

    /// Change a logger's level.
    ///
    /// `Unsupported` when the application has no framework or the framework
    /// cannot change this level; `NotFound` for an unknown logger.
    pub fn set_logger_level(&self, application: &str, logger: &str, level: Level) -> Result<()> {
        let app = self.application(application)?;
        let factory = self.factory_for(&app, None)?.ok_or_else(|| {
            ProbeError::Unsupported(format!("{} has no recognized logging framework", application))
        })?;
        let target = factory.logger(logger)?.ok_or_else(|| {
            warn!("{}: logger {} not found", application, logger);
            ProbeError::NotFound(format!("logger {} in {}", logger, application))
        })?;
        target.set_level(level)
    }

    /// Appenders of every deployed application. A failing application is
    /// reported with its error and does not stop the others.
    pub fn list_all_appenders(&self) -> Vec<ApplicationReport> {
        self.application_names()
            .into_iter()
            .map(|application| self.report(application))
            .collect()
    }

    /// Appenders of one application as a report; never fails.
    pub fn report(&self, application: String) -> ApplicationReport {
        match self.appenders_of(&application) {
            Ok((framework, appenders)) => ApplicationReport {
                application,
                framework,
                appenders,
                error: None,
            },
            Err(e) => {
                report_failure(&application, &e);
                ApplicationReport {
                    application,
                    framework: None,
                    appenders: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

fn first_file(
    logger: &dyn LoggerAccessor,
) -> Result<Option<(Box<dyn AppenderAccessor>, PathBuf)>> {
    for appender in logger.appenders()? {
        if let Some(file) = appender.file()? {
            return Ok(Some((appender, file)));
        }
    }
    Ok(None)
}

fn report_failure(application: &str, e: &ProbeError) {
    match e {
        ProbeError::ForeignInvocation(_) => error!("{}: {}", application, e),
        ProbeError::NotFound(_) | ProbeError::Unsupported(_) => debug!("{}: {}", application, e),
        _ => warn!("{}: {}", application, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::{build_host, HostDescription};
    use crate::foreign::DynamicHost;

    fn host() -> Arc<DynamicHost> {
        let description = HostDescription::from_toml_str(
            r#"
            [[applications]]
            name = "shop"
            work_dir = "/apps/shop"
            framework = "log4j"

            [[applications.loggers]]
            name = "root"
            level = "INFO"
            appenders = ["console"]

            [[applications.loggers]]
            name = "com.shop"
            appenders = ["file"]

            [[applications.loggers]]
            name = "com.shop.cart"

            [[applications.appenders]]
            name = "console"
            kind = "console"

            [[applications.appenders]]
            name = "file"
            kind = "file"
            file = "logs/shop.log"

            [[applications]]
            name = "static"
            work_dir = "/apps/static"
            "#,
        )
        .unwrap();
        Arc::new(build_host(&description).unwrap())
    }

    fn resolver() -> LogResolver {
        let mut config = ProbeConfig::default();
        config.resolver.call_timeout_ms = 0;
        LogResolver::new(host(), config)
    }

    #[test]
    fn test_file_inherited_from_parent() {
        let resolver = resolver();
        let destination = resolver
            .resolve_destination(&LogSpec::logger("shop", "com.shop.cart"))
            .unwrap();
        assert_eq!(destination.file(), Path::new("/apps/shop/logs/shop.log"));
        assert_eq!(destination.source(), DestinationSource::Appender);
        assert_eq!(destination.framework(), Some(FrameworkKind::Log4j));
        assert_eq!(destination.logger().unwrap().name().unwrap(), "com.shop.cart");

        let summary = destination.summary();
        assert_eq!(summary.appender.as_deref(), Some("file"));
        assert!(!summary.exists);
    }

    #[test]
    fn test_root_without_file_uses_convention() {
        let resolver = resolver();
        let destination = resolver.resolve_destination(&LogSpec::root("shop")).unwrap();
        assert_eq!(destination.source(), DestinationSource::Convention);
        assert_eq!(destination.file(), Path::new("/apps/shop/logs/catalina.out"));
        assert!(destination.logger().is_some());
    }

    #[test]
    fn test_console_and_access_logs() {
        let resolver = resolver();
        let access = resolver
            .resolve_destination(&LogSpec::new("static", LogTarget::Access))
            .unwrap();
        assert_eq!(
            access.file(),
            Path::new("/apps/static/logs/localhost_access_log.txt")
        );
        let console = resolver
            .resolve_destination(&LogSpec::new("shop", LogTarget::Console))
            .unwrap();
        assert_eq!(console.file(), Path::new("/apps/shop/logs/catalina.out"));
    }

    #[test]
    fn test_requested_appender() {
        let resolver = resolver();
        let spec = LogSpec::logger("shop", "com.shop").with_appender("file");
        let destination = resolver.resolve_destination(&spec).unwrap();
        assert_eq!(destination.appender().unwrap().name().unwrap(), "file");

        let spec = LogSpec::logger("shop", "com.shop").with_appender("missing");
        assert!(matches!(
            resolver.resolve_destination(&spec),
            Err(ProbeError::NotFound(_))
        ));
    }

    #[test]
    fn test_explicit_framework_not_present() {
        let resolver = resolver();
        let spec = LogSpec::root("shop").with_framework(FrameworkKind::Logback);
        assert!(matches!(
            resolver.resolve_destination(&spec),
            Err(ProbeError::NotFound(_))
        ));
    }

    #[test]
    fn test_unknown_application() {
        let resolver = resolver();
        assert!(matches!(
            resolver.resolve_destination(&LogSpec::root("nope")),
            Err(ProbeError::NotFound(_))
        ));
        assert!(resolver.list_appenders("nope").is_err());
    }

    #[test]
    fn test_set_level_without_framework_is_unsupported() {
        let resolver = resolver();
        assert!(matches!(
            resolver.set_logger_level("static", "root", Level::Debug),
            Err(ProbeError::Unsupported(_))
        ));
        assert!(matches!(
            resolver.set_logger_level("shop", "com.nowhere", Level::Debug),
            Err(ProbeError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_loggers() {
        let resolver = resolver();
        let loggers = resolver.list_loggers("shop").unwrap();
        let cart = loggers.iter().find(|l| l.name == "com.shop.cart").unwrap();
        assert_eq!(cart.level, Level::Inherit);
        assert_eq!(cart.effective_level, Level::Info);
        assert!(resolver.list_loggers("static").unwrap().is_empty());
    }

    #[test]
    fn test_select_factory() {
        let resolver = resolver();
        let shop = resolver.application("shop").unwrap();
        let factory = resolver.select_factory(&shop).unwrap();
        assert_eq!(factory.framework(), FrameworkKind::Log4j);
        assert_eq!(factory.application(), "shop");

        let bare = resolver.application("static").unwrap();
        assert!(resolver.select_factory(&bare).is_none());
    }

    #[test]
    fn test_log_spec_serde() {
        let spec: LogSpec = serde_json::from_str(
            r#"{"application":"shop","target":{"kind":"logger","name":"com.shop"}}"#,
        )
        .unwrap();
        assert_eq!(spec, LogSpec::logger("shop", "com.shop"));
    }
}
