mod base;
mod error;
mod level;
mod model;

pub use base::{
    CallPolicy, CapabilityAccessor, OwningApplication, DEFAULT_CALL_TIMEOUT,
    DEFAULT_MAX_HIERARCHY_DEPTH,
};
pub use error::InvokeError;
pub use level::Level;
pub use model::{
    AppenderAccessor, AppenderInfo, AppenderKind, FactoryAccessor, FrameworkKind, LoggerAccessor,
    LoggerInfo, ROOT_LOGGER_NAME,
};
