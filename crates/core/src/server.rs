// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server registry records and handler registrations.

use crate::attrs::AttrMap;
use crate::id::ServerId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Lifecycle of a registered runner process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Startup,
    Running,
    Shutdown,
    Error,
}

crate::simple_display! {
    ServerState {
        Startup => "startup",
        Running => "running",
        Shutdown => "shutdown",
        Error => "error",
    }
}

/// Per-process registration, heartbeaten while the process lives.
///
/// A stale `ping_time` may be treated as a dead server by observers; it has
/// no effect on execution correctness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDefinition {
    pub id: ServerId,
    #[serde(default)]
    pub server_group: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub ips: Vec<String>,
    pub start_time: u64,
    pub ping_time: u64,
    /// Glob filters restricting which facets this server services.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Facet names this server has handlers for.
    #[serde(default)]
    pub handlers: Vec<String>,
    /// Per-facet handled counters. Approximate: concurrent runners may
    /// undercount; correctness never depends on these.
    #[serde(default)]
    pub handled: IndexMap<String, u64>,
    pub state: ServerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerDefinition {
    pub fn record_handled(&mut self, facet_name: &str) {
        *self.handled.entry(facet_name.to_string()).or_insert(0) += 1;
    }
}

crate::builder! {
    pub struct ServerBuilder => ServerDefinition {
        into {
            server_group: String = "agents",
            service_name: String = "af-runner",
            server_name: String = "runner-1",
        }
        set {
            id: ServerId = ServerId::generate(),
            ips: Vec<String> = Vec::new(),
            start_time: u64 = 0,
            ping_time: u64 = 0,
            topics: Vec<String> = Vec::new(),
            handlers: Vec<String> = Vec::new(),
            handled: IndexMap<String, u64> = IndexMap::new(),
            state: ServerState = ServerState::Startup,
        }
        option {
            error: String = None,
        }
    }
}

/// Maps a facet name to an addressable handler implementation.
///
/// `checksum` is the cache-invalidation key: dispatchers cache loaded
/// modules by `(module_uri, checksum)` and reload when either changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerRegistration {
    /// Qualified facet name; primary key.
    pub facet_name: String,
    pub module_uri: String,
    #[serde(default)]
    pub entrypoint: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Free-form metadata injected into handler payloads as
    /// `_handler_metadata`.
    #[serde(default)]
    pub metadata: AttrMap,
}

crate::builder! {
    pub struct RegistrationBuilder => HandlerRegistration {
        into {
            facet_name: String = "docs.CountDocuments",
            module_uri: String = "mod://handlers/docs",
            entrypoint: String = "count_documents",
            version: String = "1.0.0",
            checksum: String = "c0ffee",
        }
        set {
            requirements: Vec<String> = Vec::new(),
            metadata: AttrMap = AttrMap::new(),
        }
        option {
            timeout_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
