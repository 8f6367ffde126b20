// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory lock records.
//!
//! Locks are time-bounded and renewable. An expired lock may be taken by
//! another caller; holders must never assume exclusivity beyond the lease.

use crate::attrs::AttrMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub key: String,
    pub acquired_at: u64,
    pub expires_at: u64,
    #[serde(default)]
    pub metadata: AttrMap,
}

impl Lock {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}
