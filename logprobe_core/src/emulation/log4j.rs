//! log4j 1.x: a `LogManager` with static accessors and a logger tree with
//! real parent links.

use std::collections::BTreeMap;

use super::{
    build_loggers, optional_str, AppenderDescription, ApplicationDescription, Forge, LoggerShape,
    Registry,
};
use crate::accessor::AppenderKind;
use crate::adapters::log4j::{
    CONSOLE_APPENDER_CLASS, FILE_APPENDER_CLASS, LEVEL_CLASS, LOGGER_CLASS, LOG_MANAGER_CLASS,
};
use crate::foreign::{DynamicContext, ForeignValue, ObjectRef, ValueKind};

const ROOT_NAME: &str = "root";
const CATEGORY_CLASS: &str = "org.apache.log4j.Category";
const APPENDER_SKELETON_CLASS: &str = "org.apache.log4j.AppenderSkeleton";
const WRITER_APPENDER_CLASS: &str = "org.apache.log4j.WriterAppender";
const SOCKET_APPENDER_CLASS: &str = "org.apache.log4j.net.SocketAppender";

const LEVELS: [&str; 8] = ["OFF", "FATAL", "ERROR", "WARN", "INFO", "DEBUG", "TRACE", "ALL"];

pub(super) fn install(ctx: &DynamicContext, app: &ApplicationDescription) {
    let forge = Forge::new(ctx);
    let registry = Registry::default();
    let shape = LoggerShape {
        type_name: LOGGER_CLASS.to_string(),
        supertypes: vec![CATEGORY_CLASS.to_string()],
        level_class: LEVEL_CLASS.to_string(),
        appenders_method: "getAllAppenders",
        parent_method: Some("getParent"),
        root_key: ROOT_NAME,
    };

    let appenders: BTreeMap<String, ObjectRef> = app
        .appenders
        .iter()
        .map(|desc| (desc.name.clone(), appender(&forge, desc)))
        .collect();
    let level_of = |name: &str| forge.level(LEVEL_CLASS, "toString", name);
    build_loggers(app, &shape, &forge, &registry, &appenders, &level_of, "DEBUG");

    let root = registry.clone();
    let existing = registry.clone();
    let current = registry;
    ctx.define_class(
        LOG_MANAGER_CLASS,
        ctx.statics()
            .method("getRootLogger", vec![], move |_| Ok(root.get(ROOT_NAME).into()))
            .method("exists", vec![ValueKind::Str], move |args| {
                Ok(args[0].as_str().and_then(|name| existing.get(name)).into())
            })
            .method("getCurrentLoggers", vec![], move |_| {
                Ok(ForeignValue::List(
                    current
                        .all_except(ROOT_NAME)
                        .into_iter()
                        .map(ForeignValue::Object)
                        .collect(),
                ))
            }),
    );

    let levels = forge.clone();
    ctx.define_class(
        LEVEL_CLASS,
        ctx.statics().method("toLevel", vec![ValueKind::Str], move |args| {
            // Unrecognized names fall back to DEBUG.
            let requested = args[0].as_str().unwrap_or_default().to_uppercase();
            let name = if LEVELS.contains(&requested.as_str()) {
                requested
            } else {
                "DEBUG".to_string()
            };
            Ok(levels.level(LEVEL_CLASS, "toString", &name).into())
        }),
    );

    for class in [
        LOGGER_CLASS,
        CATEGORY_CLASS,
        APPENDER_SKELETON_CLASS,
        WRITER_APPENDER_CLASS,
        FILE_APPENDER_CLASS,
        CONSOLE_APPENDER_CLASS,
    ] {
        ctx.define_class(class, ctx.statics());
    }
}

fn appender(forge: &Forge, desc: &AppenderDescription) -> ObjectRef {
    let builder = match desc.kind {
        AppenderKind::File => forge
            .object(FILE_APPENDER_CLASS)
            .extends([WRITER_APPENDER_CLASS, APPENDER_SKELETON_CLASS])
            .constant("getFile", optional_str(&desc.file)),
        AppenderKind::Console => forge
            .object(CONSOLE_APPENDER_CLASS)
            .extends([WRITER_APPENDER_CLASS, APPENDER_SKELETON_CLASS]),
        AppenderKind::Other => forge
            .object(SOCKET_APPENDER_CLASS)
            .extends([APPENDER_SKELETON_CLASS]),
    };
    builder.constant("getName", desc.name.as_str()).build()
}
