/// Console and file logger setup for binaries.
pub mod loggerlocal;

pub use loggerlocal::{parse_level, setup_logging, LoggerError};
