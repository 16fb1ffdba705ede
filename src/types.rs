//! Data structures used throughout the operator.
//!
//! These types are serialised using [`serde`](https://serde.rs/) where
//! they cross the host boundary (hook events arrive as JSON lines).  They
//! represent the endpoint values exchanged over the F1 relation, the
//! events raised to the owning operator and the lifecycle hooks delivered
//! by the host runtime.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Runtime-assigned identifier of one relation instance.
pub type RelationId = u32;

/// Key-value data owned by one application on one relation instance.
pub type Slot = HashMap<String, String>;

/// A reachable network endpoint for one side of the F1 link.
///
/// Both fields are opaque strings.  The relation store carries strings
/// only, so addresses are never parsed as IPs and ports are never parsed
/// as integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
    pub port: String,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Which side of the F1 link a set of slot keys belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Central unit, the provider side.
    Cu,
    /// Distributed unit, the requirer side.
    Du,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Cu => "cu",
            Role::Du => "du",
        }
    }

    pub fn address_key(&self) -> &'static str {
        match self {
            Role::Cu => "cu_address",
            Role::Du => "du_address",
        }
    }

    pub fn port_key(&self) -> &'static str {
        match self {
            Role::Cu => "cu_port",
            Role::Du => "du_port",
        }
    }
}

/// Discriminant used to subscribe to a family of [`F1Event`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PeerEndpointAvailable,
}

/// Events raised by the relation library to its owning operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum F1Event {
    /// Both endpoint fields of the peer are present in its slot.
    /// `role` is the side the endpoint belongs to.
    PeerEndpointAvailable {
        relation_id: RelationId,
        role: Role,
        address: String,
        port: String,
    },
}

impl F1Event {
    pub fn kind(&self) -> EventKind {
        match self {
            F1Event::PeerEndpointAvailable { .. } => EventKind::PeerEndpointAvailable,
        }
    }
}

/// Lifecycle notifications delivered by the host runtime.
///
/// Relation hooks carry the relation name so the operator can route them
/// to the watcher registered for that relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookEvent {
    Install,
    ConfigChanged,
    /// The workload container became reachable.
    WorkloadReady,
    RelationJoined { relation_name: String, id: RelationId },
    RelationChanged { relation_name: String, id: RelationId },
    RelationBroken { relation_name: String, id: RelationId },
}

impl HookEvent {
    /// The relation instance a relation hook is about.
    pub fn relation_id(&self) -> Option<RelationId> {
        match self {
            HookEvent::RelationJoined { id, .. }
            | HookEvent::RelationChanged { id, .. }
            | HookEvent::RelationBroken { id, .. } => Some(*id),
            HookEvent::Install | HookEvent::ConfigChanged | HookEvent::WorkloadReady => None,
        }
    }
}

/// Status the operator reports for its unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Unknown,
    Maintenance(String),
    Waiting(String),
    Blocked(String),
    Active,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Unknown => write!(f, "unknown"),
            UnitStatus::Maintenance(msg) => write!(f, "maintenance: {}", msg),
            UnitStatus::Waiting(msg) => write!(f, "waiting: {}", msg),
            UnitStatus::Blocked(msg) => write!(f, "blocked: {}", msg),
            UnitStatus::Active => write!(f, "active"),
        }
    }
}
