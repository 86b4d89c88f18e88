//! Per-device upgrade orchestration

pub mod fsm;
pub mod health;
pub mod job;
pub mod orchestrator;
pub mod registry;
pub mod report;
