//! Operation log: redacted audit trail of user actions.

mod logger;
mod redaction;
mod routes;

pub use logger::{
    InMemoryOperationLogStore, NewOperation, OperationLog, OperationLogStore, OperationLogger,
};
pub use redaction::{REDACTED, RedactionPolicy, TRUNCATED};
pub use routes::OperationLogModule;
