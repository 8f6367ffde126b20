// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Facet attribute bags.

use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered attribute name → value mapping.
pub type AttrMap = IndexMap<String, Value>;

/// The two attribute bags every step carries: `params` are the evaluated
/// inputs of the called facet, `returns` are the outputs produced by the
/// facet, its blocks, or an agent reply.
///
/// Attributes are written once per phase. The evaluator may overwrite a
/// value it wrote itself within the same phase, but values merged from a
/// completed child are never overwritten out of order — yield targets are
/// validated upstream to be unique per block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetAttributes {
    #[serde(default)]
    pub params: AttrMap,
    #[serde(default)]
    pub returns: AttrMap,
}

impl FacetAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn ret(&self, name: &str) -> Option<&Value> {
        self.returns.get(name)
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: Value) {
        self.params.insert(name.into(), value);
    }

    pub fn set_return(&mut self, name: impl Into<String>, value: Value) {
        self.returns.insert(name.into(), value);
    }

    /// Fill in a param only when absent (used for facet defaults and
    /// implicit declarations, which never shadow explicit arguments).
    pub fn default_param(&mut self, name: &str, value: Value) {
        if !self.params.contains_key(name) {
            self.params.insert(name.to_string(), value);
        }
    }

    /// Merge a result mapping into returns, last writer wins per key.
    pub fn merge_returns(&mut self, result: &AttrMap) {
        for (name, value) in result {
            self.returns.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
#[path = "attrs_tests.rs"]
mod tests;
