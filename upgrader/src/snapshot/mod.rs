//! Network state snapshots, comparison and reporting

pub mod diff;
pub mod report;
pub mod store;
