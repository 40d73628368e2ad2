//! `java.util.logging` with the server's JULI file handlers.

use std::collections::BTreeMap;

use super::{
    build_loggers, optional_str, AppenderDescription, ApplicationDescription, Forge, LoggerShape,
    Registry,
};
use crate::accessor::AppenderKind;
use crate::adapters::jdk::{
    CONSOLE_HANDLER_CLASS, FILE_HANDLER_CLASS, LEVEL_CLASS, LOGGER_CLASS, LOG_MANAGER_CLASS,
};
use crate::foreign::{DynamicContext, ForeignFault, ForeignValue, ObjectRef, ValueKind};

const ROOT_NAME: &str = "";
const HANDLER_CLASS: &str = "java.util.logging.Handler";
const STREAM_HANDLER_CLASS: &str = "java.util.logging.StreamHandler";
const SOCKET_HANDLER_CLASS: &str = "java.util.logging.SocketHandler";

const LEVELS: [&str; 9] = [
    "OFF", "SEVERE", "WARNING", "INFO", "CONFIG", "FINE", "FINER", "FINEST", "ALL",
];

/// Accept the common level names in descriptions as well as the native ones.
fn native_level(name: &str) -> String {
    match name.to_uppercase().as_str() {
        "ERROR" | "FATAL" => "SEVERE".to_string(),
        "WARN" => "WARNING".to_string(),
        "DEBUG" => "FINE".to_string(),
        "TRACE" => "FINEST".to_string(),
        other => other.to_string(),
    }
}

pub(super) fn install(ctx: &DynamicContext, app: &ApplicationDescription) {
    let forge = Forge::new(ctx);
    let registry = Registry::default();
    let shape = LoggerShape {
        type_name: LOGGER_CLASS.to_string(),
        supertypes: Vec::new(),
        level_class: LEVEL_CLASS.to_string(),
        appenders_method: "getHandlers",
        parent_method: Some("getParent"),
        root_key: ROOT_NAME,
    };

    let handlers: BTreeMap<String, ObjectRef> = app
        .appenders
        .iter()
        .map(|desc| (desc.name.clone(), handler(&forge, desc)))
        .collect();
    let level_of = |name: &str| forge.level(LEVEL_CLASS, "getName", &native_level(name));
    build_loggers(app, &shape, &forge, &registry, &handlers, &level_of, "INFO");

    let lookup = registry.clone();
    let names = registry;
    let manager = forge
        .object(LOG_MANAGER_CLASS)
        .method("getLogger", vec![ValueKind::Str], move |args| {
            Ok(args[0].as_str().and_then(|name| lookup.get(name)).into())
        })
        .method("getLoggerNames", vec![], move |_| {
            Ok(ForeignValue::List(
                names.names().into_iter().map(ForeignValue::from).collect(),
            ))
        })
        .build();
    ctx.define_class(
        LOG_MANAGER_CLASS,
        ctx.statics().constant("getLogManager", manager),
    );

    let levels = forge.clone();
    ctx.define_class(
        LEVEL_CLASS,
        ctx.statics().method("parse", vec![ValueKind::Str], move |args| {
            let requested = args[0].as_str().unwrap_or_default().to_uppercase();
            if !LEVELS.contains(&requested.as_str()) {
                return Err(ForeignFault::new(format!(
                    "java.lang.IllegalArgumentException: Bad level \"{}\"",
                    requested
                )));
            }
            Ok(levels.level(LEVEL_CLASS, "getName", &requested).into())
        }),
    );

    for class in [
        LOGGER_CLASS,
        HANDLER_CLASS,
        STREAM_HANDLER_CLASS,
        FILE_HANDLER_CLASS,
        CONSOLE_HANDLER_CLASS,
    ] {
        ctx.define_class(class, ctx.statics());
    }
}

fn handler(forge: &Forge, desc: &AppenderDescription) -> ObjectRef {
    match desc.kind {
        AppenderKind::File => forge
            .object(FILE_HANDLER_CLASS)
            .extends([STREAM_HANDLER_CLASS, HANDLER_CLASS])
            .constant("getDirectory", optional_str(&desc.directory))
            .constant("getPrefix", optional_str(&desc.prefix))
            .constant("getSuffix", optional_str(&desc.suffix))
            .build(),
        AppenderKind::Console => forge
            .object(CONSOLE_HANDLER_CLASS)
            .extends([STREAM_HANDLER_CLASS, HANDLER_CLASS])
            .build(),
        AppenderKind::Other => forge
            .object(SOCKET_HANDLER_CLASS)
            .extends([STREAM_HANDLER_CLASS, HANDLER_CLASS])
            .build(),
    }
}
