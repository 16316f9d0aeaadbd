//! Database module
//!
//! Account, session and login-attempt records, the `Store` interface the
//! rest of the crate is written against, and its two implementations.

pub mod memory;
pub mod models;
pub mod operations;
pub mod repository;

pub use memory::MemoryStore;
pub use models::{
    Account, AccountSummary, FailReason, LoginAttempt, Origin, Role, Session, SessionSummary,
};
pub use operations::DbOperations;
pub use repository::Store;
