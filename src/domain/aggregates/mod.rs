//! Aggregates module
pub mod hierarchy;
pub mod session;

pub use hierarchy::Hierarchy;
pub use session::{AssignmentRole, AssignmentSession, Draft, ProductChanges, SessionState, TermsChanges};
