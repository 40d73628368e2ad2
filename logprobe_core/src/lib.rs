pub mod accessor;
pub mod adapters;
pub mod config;
pub mod emulation;
pub mod error;
pub mod foreign;
pub mod resolver;

pub use accessor::{
    AppenderAccessor, AppenderInfo, AppenderKind, CallPolicy, CapabilityAccessor,
    FactoryAccessor, FrameworkKind, Level, LoggerAccessor, LoggerInfo, ROOT_LOGGER_NAME,
};
pub use adapters::{adapter_for, FrameworkAdapter, DEFAULT_ADAPTER_ORDER};
pub use config::ProbeConfig;
pub use emulation::{build_host, HostDescription};
pub use error::{ProbeError, Result};
pub use foreign::{DynamicHost, HostRuntime};
pub use resolver::{
    ApplicationReport, Destination, DestinationSource, DestinationSummary, LogResolver, LogSpec,
    LogTarget,
};
