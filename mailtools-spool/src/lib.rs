pub mod config;
pub mod error;
pub mod queue_file;
pub mod retry;
pub mod spool;
pub mod types;

pub use config::{SpoolConfig, SpoolConfigBuilder};
pub use error::{HandlerError, Result, SpoolError, ValidationError};
pub use retry::RetryPolicy;
pub use spool::{Deferral, Spool, SpoolEntry};
pub use types::{EntryState, SpoolEntryName};
