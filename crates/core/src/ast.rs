// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AST types for submitted workflows and programs.
//!
//! The AFL parser/validator lives outside this system; callers submit these
//! structures as JSON. Everything here is plain data with serde round-trip
//! support — no evaluation logic.

use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A program: the facet, schema, and implicit declarations a workflow's
/// statements resolve against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramAst {
    #[serde(default)]
    pub facets: Vec<FacetDecl>,
    #[serde(default)]
    pub schemas: Vec<SchemaDecl>,
    #[serde(default)]
    pub implicits: Vec<ImplicitDecl>,
}

impl ProgramAst {
    pub fn facet(&self, name: &str) -> Option<&FacetDecl> {
        self.facets.iter().find(|f| f.name == name)
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaDecl> {
        self.schemas.iter().find(|s| s.name == name)
    }

    /// Implicit params declared for a facet, in declaration order.
    pub fn implicits_for<'a>(&'a self, facet: &'a str) -> impl Iterator<Item = &'a ImplicitDecl> {
        self.implicits.iter().filter(move |i| i.facet == facet)
    }
}

/// A workflow declaration: name, inputs with defaults, and body blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowAst {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub body: Vec<BlockAst>,
}

/// A declared parameter with an optional default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A facet declaration. Event facets are serviced by agents; non-event
/// facets complete inline. A facet may carry its own body blocks, used
/// when the calling statement has none of its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetDecl {
    /// Qualified name, e.g. `docs.CountDocuments`.
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub event: bool,
    #[serde(default)]
    pub body: Vec<BlockAst>,
    /// Embedded script snippet. Script execution is not supported by this
    /// runtime; a facet whose body is a script fails the calling step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

/// A schema declaration: a named record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDecl {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// A program-level implicit argument for a facet. Precedence: explicit
/// argument > implicit > facet default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplicitDecl {
    pub facet: String,
    pub param: String,
    pub value: Value,
}

/// Block combinator kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    #[default]
    #[serde(rename = "andThen")]
    AndThen,
    #[serde(rename = "andMap")]
    AndMap,
    #[serde(rename = "andMatch")]
    AndMatch,
}

crate::simple_display! {
    BlockKind {
        AndThen => "andThen",
        AndMap => "andMap",
        AndMatch => "andMatch",
    }
}

/// A block body: an ordered list of statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockAst {
    #[serde(default)]
    pub kind: BlockKind,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

/// One statement inside a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statement {
    Assignment(AssignmentStatement),
    Yield(YieldStatement),
}

impl Statement {
    /// Stable statement identifier within its block. Assignment names are
    /// unique per block; yield targets are unique per block (the validator
    /// rejects double yields to one target).
    pub fn id(&self) -> String {
        match self {
            Statement::Assignment(a) => a.name.clone(),
            Statement::Yield(y) => format!("yield-{}", y.target),
        }
    }
}

/// `name = Facet(arg = expr, ...)` with optional inline body blocks and an
/// optional foreach clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentStatement {
    pub name: String,
    pub facet: String,
    #[serde(default)]
    pub args: IndexMap<String, Expr>,
    #[serde(default)]
    pub body: Vec<BlockAst>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreach: Option<ForeachClause>,
}

/// `foreach var in iterable` fan-out over the statement's body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeachClause {
    pub var: String,
    pub iterable: Expr,
}

/// `yield Target(arg = expr, ...)` — merges evaluated args into the
/// target's returns at block completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldStatement {
    pub target: String,
    #[serde(default)]
    pub args: IndexMap<String, Expr>,
}

/// Binary arithmetic / concatenation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
}

crate::simple_display! {
    BinaryOp {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Mod => "%",
    }
}

/// An attribute expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// Literal value.
    Lit { value: Value },
    /// `$.name` — workflow input reference.
    Input { name: String },
    /// `step.attr.path` — a completed sibling step's return attribute.
    StepRef { step: String, path: Vec<String> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Array { items: Vec<Expr> },
    Map { entries: IndexMap<String, Expr> },
    Index { base: Box<Expr>, index: Box<Expr> },
    Call { function: String, args: Vec<Expr> },
    Group { inner: Box<Expr> },
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Lit { value } => write!(f, "{}", value),
            Expr::Input { name } => write!(f, "$.{}", name),
            Expr::StepRef { step, path } => {
                write!(f, "{}", step)?;
                for seg in path {
                    write!(f, ".{}", seg)?;
                }
                Ok(())
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op, rhs),
            Expr::Array { items } => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Expr::Map { entries } => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
            Expr::Index { base, index } => write!(f, "{}[{}]", base, index),
            Expr::Call { function, args } => {
                write!(f, "{}(", function)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expr::Group { inner } => write!(f, "({})", inner),
        }
    }
}

// Expression and statement constructors for tests and embedding callers.
#[cfg(any(test, feature = "test-support"))]
mod build {
    use super::*;

    impl Expr {
        pub fn int(i: i64) -> Self {
            Expr::Lit { value: Value::Int(i) }
        }

        pub fn str(s: impl Into<String>) -> Self {
            Expr::Lit { value: Value::Str(s.into()) }
        }

        pub fn input(name: impl Into<String>) -> Self {
            Expr::Input { name: name.into() }
        }

        pub fn step_attr(step: impl Into<String>, attr: impl Into<String>) -> Self {
            Expr::StepRef { step: step.into(), path: vec![attr.into()] }
        }

        pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
            Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
        }

        pub fn add(lhs: Expr, rhs: Expr) -> Self {
            Self::binary(BinaryOp::Add, lhs, rhs)
        }
    }

    impl AssignmentStatement {
        pub fn call(
            name: impl Into<String>,
            facet: impl Into<String>,
            args: impl IntoIterator<Item = (&'static str, Expr)>,
        ) -> Statement {
            Statement::Assignment(AssignmentStatement {
                name: name.into(),
                facet: facet.into(),
                args: args.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                body: Vec::new(),
                foreach: None,
            })
        }
    }

    impl YieldStatement {
        pub fn to(
            target: impl Into<String>,
            args: impl IntoIterator<Item = (&'static str, Expr)>,
        ) -> Statement {
            Statement::Yield(YieldStatement {
                target: target.into(),
                args: args.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            })
        }
    }
}

#[cfg(test)]
#[path = "ast_tests.rs"]
mod tests;
