//! Data models

pub mod artifact;
pub mod device;
pub mod snapshot;
