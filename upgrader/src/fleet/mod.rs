//! Fleet-wide upgrade runs

pub mod scheduler;
pub mod summary;
