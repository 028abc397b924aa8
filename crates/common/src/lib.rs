pub mod env_flags;
pub mod structured_logging;

pub use env_flags::parse_flag;
pub use structured_logging::{
    init_structured_logging,
    JsonLayer,
    LoggingConfig,
    OperationTimer,
    StructuredLogEntry,
};
