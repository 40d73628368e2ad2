use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::future::join_all;
use logprobe_core::{
    build_host, ApplicationReport, FrameworkKind, HostDescription, Level, LogResolver, LogSpec,
    LogTarget, ProbeConfig, ProbeError, Result,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "logprobe", version, about = "Find and adjust the logs of hosted applications")]
struct Cli {
    /// Host description listing the deployed applications
    #[arg(long, global = true, default_value = "host.toml")]
    host: PathBuf,

    /// Resolver configuration; LogProbe.toml is searched for when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve one logical log of an application to a file
    Resolve {
        #[arg(long)]
        app: String,

        /// Framework logger name
        #[arg(long, conflicts_with_all = ["root", "console", "access"])]
        logger: Option<String>,

        /// The root logger (the default)
        #[arg(long)]
        root: bool,

        /// The server console log
        #[arg(long, conflicts_with = "access")]
        console: bool,

        /// The request access log
        #[arg(long)]
        access: bool,

        /// Use this framework instead of the first one found
        #[arg(long)]
        framework: Option<FrameworkKind>,

        /// Use this appender of the logger
        #[arg(long)]
        appender: Option<String>,
    },
    /// List every appender of an application
    Appenders {
        #[arg(long)]
        app: String,
    },
    /// List every logger of an application
    Loggers {
        #[arg(long)]
        app: String,
    },
    /// Change the level of a logger
    SetLevel {
        #[arg(long)]
        app: String,

        #[arg(long)]
        logger: String,

        /// OFF, FATAL, ERROR, WARN, INFO, DEBUG, TRACE, ALL or INHERIT
        #[arg(long)]
        level: Level,
    },
    /// List the appenders of every application
    Survey,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(e: &ProbeError) -> i32 {
    match e {
        ProbeError::NotFound(_) => 2,
        ProbeError::Unsupported(_) => 3,
        _ => 1,
    }
}

fn resolver(cli: &Cli) -> Result<LogResolver> {
    let config = match &cli.config {
        Some(path) => ProbeConfig::load(path)?,
        None => ProbeConfig::from_project_root()?,
    };
    let description = HostDescription::load(&cli.host)?;
    let host = build_host(&description)?;
    debug!(
        "Loaded {} applications from {}",
        description.applications.len(),
        cli.host.display()
    );
    Ok(LogResolver::new(Arc::new(host), config))
}

fn target(logger: Option<String>, console: bool, access: bool) -> LogTarget {
    match (logger, console, access) {
        (Some(name), _, _) => LogTarget::Logger(name),
        (None, true, _) => LogTarget::Console,
        (None, false, true) => LogTarget::Access,
        (None, false, false) => LogTarget::Root,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| ProbeError::Io(e.into()))?;
    println!("{}", text);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let resolver = resolver(&cli)?;

    match cli.command {
        Commands::Resolve {
            app,
            logger,
            root: _,
            console,
            access,
            framework,
            appender,
        } => {
            let mut spec = LogSpec::new(app, target(logger, console, access));
            spec.framework = framework;
            spec.appender = appender;
            let destination = resolver.resolve_destination(&spec)?;
            print_json(&destination.summary())
        }
        Commands::Appenders { app } => print_json(&resolver.list_appenders(&app)?),
        Commands::Loggers { app } => print_json(&resolver.list_loggers(&app)?),
        Commands::SetLevel { app, logger, level } => {
            resolver.set_logger_level(&app, &logger, level)?;
            info!("{}: {} set to {}", app, logger, level);
            print_json(&json!({
                "application": app,
                "logger": logger,
                "level": level,
            }))
        }
        Commands::Survey => {
            let runtime = tokio::runtime::Runtime::new()?;
            let reports = runtime.block_on(survey(Arc::new(resolver)));
            print_json(&reports)
        }
    }
}

/// Report every application concurrently; foreign calls block, so each runs
/// on the blocking pool.
async fn survey(resolver: Arc<LogResolver>) -> Vec<ApplicationReport> {
    let tasks = resolver.application_names().into_iter().map(|application| {
        let resolver = resolver.clone();
        tokio::task::spawn_blocking(move || resolver.report(application))
    });

    join_all(tasks)
        .await
        .into_iter()
        .filter_map(|joined| match joined {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Survey task failed: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_resolve() {
        let cli = Cli::try_parse_from([
            "logprobe", "--host", "demo/host.toml", "resolve", "--app", "shop", "--logger",
            "com.shop", "--framework", "log4j",
        ])
        .unwrap();
        match cli.command {
            Commands::Resolve {
                app,
                logger,
                framework,
                ..
            } => {
                assert_eq!(app, "shop");
                assert_eq!(logger.as_deref(), Some("com.shop"));
                assert_eq!(framework, Some(FrameworkKind::Log4j));
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from([
            "logprobe", "resolve", "--app", "shop", "--logger", "x", "--console",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "logprobe", "set-level", "--app", "shop", "--logger", "x", "--level", "LOUD",
        ])
        .is_err());
    }

    #[test]
    fn test_target() {
        assert_eq!(target(None, false, false), LogTarget::Root);
        assert_eq!(target(None, true, false), LogTarget::Console);
        assert_eq!(target(None, false, true), LogTarget::Access);
        assert_eq!(
            target(Some("a.b".into()), false, false),
            LogTarget::Logger("a.b".into())
        );
    }

    #[tokio::test]
    async fn test_survey_reports_every_application() {
        let temp_dir = tempdir().unwrap();
        let host_path = temp_dir.path().join("host.toml");
        let description = toml::toml! {
            [[applications]]
            name = "shop"
            work_dir = "/apps/shop"
            framework = "log4j"

            [[applications.loggers]]
            name = "root"
            appenders = ["file"]

            [[applications.appenders]]
            name = "file"
            kind = "file"
            file = "logs/shop.log"

            [[applications]]
            name = "static"
            work_dir = "/apps/static"

            [[applications]]
            name = "archived"
            work_dir = "/apps/archived"
            running = false
        };
        fs::write(&host_path, description.to_string()).unwrap();

        let cli = Cli::try_parse_from([
            "logprobe",
            "--host",
            host_path.to_str().unwrap(),
            "--config",
            temp_dir.path().join("missing.toml").to_str().unwrap(),
            "survey",
        ])
        .unwrap();
        assert!(matches!(resolver(&cli), Err(ProbeError::Config(_))));

        let description = HostDescription::load(&host_path).unwrap();
        let host = build_host(&description).unwrap();
        let resolver = Arc::new(LogResolver::new(Arc::new(host), ProbeConfig::default()));

        let mut reports = survey(resolver).await;
        reports.sort_by(|a, b| a.application.cmp(&b.application));
        assert_eq!(reports.len(), 3);
        assert!(reports[0].error.is_some());
        assert_eq!(reports[1].appenders.len(), 1);
        assert_eq!(reports[1].framework, Some(FrameworkKind::Log4j));
        assert!(reports[2].framework.is_none());
    }
}
