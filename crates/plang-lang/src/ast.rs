//! Abstract syntax tree for PLang.
//!
//! The parser produces one `PolicyDecl` per `policy` block. Conditions reuse
//! the IR `Expr` type directly; the builder only rewrites them when it hoists
//! builtin calls.

use serde::Serialize;

use plang_contracts::governance::{ActionType, GovernanceCategory};
use plang_contracts::ir::Expr;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ast {
    pub policies: Vec<PolicyDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyDecl {
    pub name: String,
    pub category: GovernanceCategory,
    /// Explicit `priority N`, if written.
    pub priority: Option<i64>,
    pub body: Vec<Statement>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Statement {
    When {
        condition: Expr,
        then_body: Vec<Statement>,
        else_body: Option<Vec<Statement>>,
        line: usize,
    },
    Action(ActionStmt),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionStmt {
    pub action: ActionType,
    pub target: Option<String>,
    pub reason: Option<String>,
    pub line: usize,
}
