//! Logback behind the SLF4J static binding, optionally repackaged.
//!
//! `LoggerContext.getLogger` creates loggers on demand, `exists` does not.

use std::collections::BTreeMap;

use super::{
    build_loggers, optional_str, AppenderDescription, ApplicationDescription, Forge, LoggerShape,
    Registry,
};
use crate::accessor::AppenderKind;
use crate::adapters::logback::{
    BINDER_CLASS, CONSOLE_APPENDER_CLASS, CONTEXT_CLASS, FILE_APPENDER_CLASS, LEVEL_CLASS,
    LOGGER_CLASS,
};
use crate::foreign::{DynamicContext, ForeignValue, ObjectRef, ValueKind};

const ROOT_NAME: &str = "ROOT";
const APPENDER_CLASS: &str = "ch.qos.logback.core.Appender";
const OUTPUT_STREAM_APPENDER_CLASS: &str = "ch.qos.logback.core.OutputStreamAppender";
const SOCKET_APPENDER_CLASS: &str = "ch.qos.logback.classic.net.SocketAppender";

const LEVELS: [&str; 7] = ["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE", "ALL"];

pub(super) fn install(ctx: &DynamicContext, app: &ApplicationDescription, prefix: &str) {
    let class = |name: &str| format!("{}{}", prefix, name);
    let level_class = class(LEVEL_CLASS);

    let forge = Forge::new(ctx);
    let registry = Registry::default();
    let shape = LoggerShape {
        type_name: class(LOGGER_CLASS),
        supertypes: Vec::new(),
        level_class: level_class.clone(),
        appenders_method: "iteratorForAppenders",
        parent_method: None,
        root_key: ROOT_NAME,
    };

    let appenders: BTreeMap<String, ObjectRef> = app
        .appenders
        .iter()
        .map(|desc| (desc.name.clone(), appender(&forge, prefix, desc)))
        .collect();
    let level_of = |name: &str| forge.level(&level_class, "toString", name);
    build_loggers(app, &shape, &forge, &registry, &appenders, &level_of, "DEBUG");

    let created = registry.clone();
    let creator = forge.clone();
    let existing = registry.clone();
    let listed = registry;
    let context = forge
        .object(&class(CONTEXT_CLASS))
        .method("getLogger", vec![ValueKind::Str], move |args| {
            let name = args[0].as_str().unwrap_or(ROOT_NAME);
            let logger = match created.get(name) {
                Some(logger) => logger,
                None => shape.build(&creator, &created, name, None, Vec::new()),
            };
            Ok(logger.into())
        })
        .method("exists", vec![ValueKind::Str], move |args| {
            Ok(args[0].as_str().and_then(|name| existing.get(name)).into())
        })
        .method("getLoggerList", vec![], move |_| {
            Ok(ForeignValue::List(
                listed.all().into_iter().map(ForeignValue::Object).collect(),
            ))
        })
        .build();
    let binder = forge
        .object(&class(BINDER_CLASS))
        .constant("getLoggerFactory", context)
        .build();
    ctx.define_class(
        &class(BINDER_CLASS),
        ctx.statics().constant("getSingleton", binder),
    );

    let levels = forge.clone();
    let parsed_class = level_class.clone();
    ctx.define_class(
        &level_class,
        ctx.statics().method("toLevel", vec![ValueKind::Str], move |args| {
            // Unrecognized names fall back to DEBUG.
            let requested = args[0].as_str().unwrap_or_default().to_uppercase();
            let name = if LEVELS.contains(&requested.as_str()) {
                requested
            } else {
                "DEBUG".to_string()
            };
            Ok(levels.level(&parsed_class, "toString", &name).into())
        }),
    );

    for name in [
        CONTEXT_CLASS,
        LOGGER_CLASS,
        APPENDER_CLASS,
        OUTPUT_STREAM_APPENDER_CLASS,
        FILE_APPENDER_CLASS,
        CONSOLE_APPENDER_CLASS,
    ] {
        ctx.define_class(&class(name), ctx.statics());
    }
}

fn appender(forge: &Forge, prefix: &str, desc: &AppenderDescription) -> ObjectRef {
    let class = |name: &str| format!("{}{}", prefix, name);
    let builder = match desc.kind {
        AppenderKind::File => forge
            .object(&class(FILE_APPENDER_CLASS))
            .extends([class(OUTPUT_STREAM_APPENDER_CLASS), class(APPENDER_CLASS)])
            .constant("getFile", optional_str(&desc.file)),
        AppenderKind::Console => forge
            .object(&class(CONSOLE_APPENDER_CLASS))
            .extends([class(OUTPUT_STREAM_APPENDER_CLASS), class(APPENDER_CLASS)]),
        AppenderKind::Other => forge
            .object(&class(SOCKET_APPENDER_CLASS))
            .extends([class(APPENDER_CLASS)]),
    };
    builder.constant("getName", desc.name.as_str()).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::build_context;
    use crate::foreign::IsolatedContext;

    #[test]
    fn test_get_logger_creates_exists_does_not() {
        let app: ApplicationDescription = toml::from_str(
            r#"
            name = "billing"
            work_dir = "/apps/billing"
            framework = "logback"
            "#,
        )
        .unwrap();
        let ctx = build_context(&app);
        let binder = ctx
            .load_class(BINDER_CLASS)
            .unwrap()
            .statics()
            .call("getSingleton", &[])
            .unwrap()
            .into_object()
            .unwrap();
        let context = binder.call("getLoggerFactory", &[]).unwrap().into_object().unwrap();

        let name = ForeignValue::from("com.fresh");
        assert!(context.call("exists", &[name.clone()]).unwrap().is_null());
        let first = context.call("getLogger", &[name.clone()]).unwrap().into_object().unwrap();
        let again = context.call("exists", &[name]).unwrap().into_object().unwrap();
        assert!(first.same_object(&again));

        let all = context.call("getLoggerList", &[]).unwrap().into_list().unwrap();
        assert_eq!(all.len(), 2);
    }
}
