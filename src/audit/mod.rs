pub mod logger;
pub mod sink;

pub use logger::AuditLogger;
pub use sink::{LogSinks, Sink};
