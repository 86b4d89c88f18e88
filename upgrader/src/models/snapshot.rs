//! Network state snapshot models

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// When a snapshot was taken relative to the upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pre,
    Post,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pre => "pre",
            Phase::Post => "post",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routing table entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Route {
    pub destination: IpNet,
    pub gateway: IpAddr,
    pub interface: String,
}

/// Operational state of a network interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceState {
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpNet>,
}

/// Session table counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub total: u64,
    pub tcp: u64,
    pub udp: u64,
}

/// Network facts collected from a device at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceState>,
    #[serde(default)]
    pub sessions: SessionCounters,
}

/// A persisted capture of network state. Never modified once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub firewall: String,
    #[serde(rename = "type")]
    pub phase: Phase,
    #[serde(flatten)]
    pub state: NetworkState,
}

impl Snapshot {
    pub fn new(firewall: impl Into<String>, phase: Phase, state: NetworkState) -> Self {
        Self {
            timestamp: Utc::now(),
            firewall: firewall.into(),
            phase,
            state,
        }
    }
}
