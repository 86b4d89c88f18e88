//! Pre/post snapshot comparison
//!
//! Routes are keyed by destination with the set of next hops as value and
//! interfaces are keyed by name, so the ordering a device reports them in
//! never shows up as a difference.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::models::snapshot::{InterfaceState, NetworkState, SessionCounters, Snapshot};

/// A single keyed difference between two states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change<K, V> {
    Added { key: K, after: V },
    Removed { key: K, before: V },
    Changed { key: K, before: V, after: V },
}

impl<K, V> Change<K, V> {
    pub fn key(&self) -> &K {
        match self {
            Change::Added { key, .. } | Change::Removed { key, .. } | Change::Changed { key, .. } => key,
        }
    }
}

/// Where a route sends traffic
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NextHop {
    pub gateway: IpAddr,
    pub interface: String,
}

pub type RouteChange = Change<IpNet, BTreeSet<NextHop>>;
pub type InterfaceChange = Change<String, InterfaceState>;

/// Session counters before and after, with signed deltas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDelta {
    pub before: SessionCounters,
    pub after: SessionCounters,
    pub total: i64,
    pub tcp: i64,
    pub udp: i64,
}

impl SessionDelta {
    pub fn between(before: SessionCounters, after: SessionCounters) -> Self {
        Self {
            before,
            after,
            total: signed_delta(before.total, after.total),
            tcp: signed_delta(before.tcp, after.tcp),
            udp: signed_delta(before.udp, after.udp),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total == 0 && self.tcp == 0 && self.udp == 0
    }
}

fn signed_delta(before: u64, after: u64) -> i64 {
    // counters beyond i64 saturate
    let before = i64::try_from(before).unwrap_or(i64::MAX);
    let after = i64::try_from(after).unwrap_or(i64::MAX);
    after.saturating_sub(before)
}

/// Structured comparison of a device's pre- and post-upgrade snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub device: String,
    pub pre_taken_at: DateTime<Utc>,
    pub post_taken_at: DateTime<Utc>,
    pub routes: Vec<RouteChange>,
    pub interfaces: Vec<InterfaceChange>,
    pub sessions: SessionDelta,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.interfaces.is_empty() && self.sessions.is_zero()
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            route_changes: self.routes.len(),
            interface_changes: self.interfaces.len(),
            session_delta: self.sessions.total,
        }
    }
}

/// Counts of what changed, carried in job reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub route_changes: usize,
    pub interface_changes: usize,
    pub session_delta: i64,
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} route change(s), {} interface change(s), sessions {:+}",
            self.route_changes, self.interface_changes, self.session_delta
        )
    }
}

/// Compare two snapshots of the same device
pub fn diff(pre: &Snapshot, post: &Snapshot) -> DiffReport {
    DiffReport {
        device: pre.firewall.clone(),
        pre_taken_at: pre.timestamp,
        post_taken_at: post.timestamp,
        routes: diff_keyed(&route_table(&pre.state), &route_table(&post.state)),
        interfaces: diff_keyed(&interface_table(&pre.state), &interface_table(&post.state)),
        sessions: SessionDelta::between(pre.state.sessions, post.state.sessions),
    }
}

fn route_table(state: &NetworkState) -> BTreeMap<IpNet, BTreeSet<NextHop>> {
    let mut table: BTreeMap<IpNet, BTreeSet<NextHop>> = BTreeMap::new();
    for route in &state.routes {
        table.entry(route.destination).or_default().insert(NextHop {
            gateway: route.gateway,
            interface: route.interface.clone(),
        });
    }
    table
}

fn interface_table(state: &NetworkState) -> BTreeMap<String, InterfaceState> {
    state
        .interfaces
        .iter()
        .map(|iface| (iface.name.clone(), iface.clone()))
        .collect()
}

fn diff_keyed<K, V>(before: &BTreeMap<K, V>, after: &BTreeMap<K, V>) -> Vec<Change<K, V>>
where
    K: Ord + Clone,
    V: PartialEq + Clone,
{
    let mut changes = Vec::new();

    for (key, old) in before {
        match after.get(key) {
            None => changes.push(Change::Removed {
                key: key.clone(),
                before: old.clone(),
            }),
            Some(new) if new != old => changes.push(Change::Changed {
                key: key.clone(),
                before: old.clone(),
                after: new.clone(),
            }),
            Some(_) => {}
        }
    }

    for (key, new) in after {
        if !before.contains_key(key) {
            changes.push(Change::Added {
                key: key.clone(),
                after: new.clone(),
            });
        }
    }

    changes.sort_by(|a, b| a.key().cmp(b.key()));
    changes
}
