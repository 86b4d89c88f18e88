//! PAN-OS Upgrade Library
//!
//! Core modules for upgrading Palo Alto Networks firewalls, one device at a
//! time or as a fleet.

pub mod cli;
pub mod device;
pub mod errors;
pub mod filesys;
pub mod fleet;
pub mod http;
pub mod logs;
pub mod models;
pub mod snapshot;
pub mod storage;
pub mod upgrade;
pub mod utils;
