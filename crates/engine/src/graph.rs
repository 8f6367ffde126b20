// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-block dependency graph.
//!
//! Scans every expression of every statement recursively and records which
//! sibling statements each one references. Given the set of completed
//! statement ids, `ready` answers which statements may have step instances
//! created, deterministically in AST order.

use af_core::{BlockAst, Expr, Statement};
use std::collections::BTreeSet;

/// One statement and its prerequisite set.
#[derive(Debug, Clone)]
pub struct GraphEntry {
    pub id: String,
    /// Statement ids inside this block that must be complete first.
    pub deps: BTreeSet<String>,
    pub is_yield: bool,
}

#[derive(Debug, Clone)]
pub struct DepGraph {
    entries: Vec<GraphEntry>,
}

impl DepGraph {
    /// Build the graph for one block. `bound` is the foreach loop variable,
    /// if any; references to it are bindings, not dependencies.
    pub fn build(block: &BlockAst, bound: Option<&str>) -> Self {
        let names: BTreeSet<String> = block
            .statements
            .iter()
            .filter_map(|s| match s {
                Statement::Assignment(a) => Some(a.name.clone()),
                Statement::Yield(_) => None,
            })
            .collect();

        let entries = block
            .statements
            .iter()
            .map(|stmt| {
                let mut refs = BTreeSet::new();
                match stmt {
                    Statement::Assignment(a) => {
                        for expr in a.args.values() {
                            scan(expr, &mut refs);
                        }
                        if let Some(clause) = &a.foreach {
                            scan(&clause.iterable, &mut refs);
                        }
                        // Inline body expressions evaluate inside the
                        // sub-block's own graph, not this one.
                    }
                    Statement::Yield(y) => {
                        for expr in y.args.values() {
                            scan(expr, &mut refs);
                        }
                    }
                }
                if let Some(var) = bound {
                    refs.remove(var);
                }
                // Only sibling statements count; inputs and out-of-block
                // names resolve (or fail) at evaluation time.
                let deps = refs.intersection(&names).cloned().collect();
                GraphEntry { id: stmt.id(), deps, is_yield: matches!(stmt, Statement::Yield(_)) }
            })
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[GraphEntry] {
        &self.entries
    }

    /// Statements whose prerequisites are all in `completed` and which are
    /// not themselves completed, in AST order.
    pub fn ready<'a>(&'a self, completed: &BTreeSet<String>) -> Vec<&'a GraphEntry> {
        self.entries
            .iter()
            .filter(|e| !completed.contains(&e.id))
            .filter(|e| e.deps.iter().all(|d| completed.contains(d)))
            .collect()
    }

    /// True once every statement in the block is in `completed`.
    pub fn is_complete(&self, completed: &BTreeSet<String>) -> bool {
        self.entries.iter().all(|e| completed.contains(&e.id))
    }
}

/// Recursively collect every step name an expression references.
fn scan(expr: &Expr, refs: &mut BTreeSet<String>) {
    match expr {
        Expr::Lit { .. } | Expr::Input { .. } => {}
        Expr::StepRef { step, .. } => {
            refs.insert(step.clone());
        }
        Expr::Binary { lhs, rhs, .. } => {
            scan(lhs, refs);
            scan(rhs, refs);
        }
        Expr::Array { items } => {
            for item in items {
                scan(item, refs);
            }
        }
        Expr::Map { entries } => {
            for value in entries.values() {
                scan(value, refs);
            }
        }
        Expr::Index { base, index } => {
            scan(base, refs);
            scan(index, refs);
        }
        Expr::Call { args, .. } => {
            for arg in args {
                scan(arg, refs);
            }
        }
        Expr::Group { inner } => scan(inner, refs),
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
