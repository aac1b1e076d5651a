//! Intermediate representation of compiled policies.
//!
//! An `IrModule` is an ordered collection of `IrFunction`s, one per policy
//! declaration. Each function owns a flat arena of `BasicBlock`s addressed by
//! `BlockId`; control flow between blocks is explicit (`Branch`, `Jump`), so
//! the interpreter never recurses over statements.
//!
//! Modules are plain data. Once compiled they are shared read-only between
//! executions (typically behind an `Arc`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::governance::{ActionType, GovernanceCategory};
use crate::value::Value;

// ── Expressions ──────────────────────────────────────────────────────────────

/// Builtin functions callable from conditions. The table is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    Contains,
    Len,
    IsEmpty,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "contains" => Some(Builtin::Contains),
            "len" => Some(Builtin::Len),
            "is_empty" => Some(Builtin::IsEmpty),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Contains => "contains",
            Builtin::Len => "len",
            Builtin::IsEmpty => "is_empty",
        }
    }

    /// Number of arguments the builtin takes.
    pub fn arity(self) -> usize {
        match self {
            Builtin::Contains => 2,
            Builtin::Len | Builtin::IsEmpty => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Index of a temporary written by a hoisted `Call` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TempId(pub u32);

/// A condition expression.
///
/// The parser never produces `Temp`; the IR builder introduces it when it
/// hoists a builtin call into its own instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    /// Dotted path such as `user.id` or `request_tier`.
    Path(Vec<String>),
    Temp(TempId),
    List(Vec<Expr>),
    Call { function: Builtin, args: Vec<Expr> },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare { op: CompareOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Path(segments) => write!(f, "{}", segments.join(".")),
            Expr::Temp(t) => write!(f, "%t{}", t.0),
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expr::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Not(inner) => write!(f, "not {}", inner),
            Expr::And(a, b) => write!(f, "({} and {})", a, b),
            Expr::Or(a, b) => write!(f, "({} or {})", a, b),
            Expr::Compare { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
        }
    }
}

// ── Instructions ─────────────────────────────────────────────────────────────

/// Index of a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// An action emission: `deny`, `allow`, `route to X`, `escalate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrAction {
    pub action: ActionType,
    /// Route destination or escalation target.
    pub target: Option<String>,
    /// Free-form reason carried by `deny` and `escalate`.
    pub reason: Option<String>,
}

/// One IR instruction. `Branch`, `Jump` and `Action` terminate their block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Evaluate a builtin and store the result in a temporary.
    Call { function: Builtin, args: Vec<Expr>, dest: TempId },
    /// Two-way conditional branch.
    Branch { condition: Expr, then_block: BlockId, else_block: BlockId },
    /// Unconditional transfer to another block.
    Jump { target: BlockId },
    /// Emit an action. Ends the function.
    Action(IrAction),
}

impl Instruction {
    /// Stable tag used to build structural condition signatures.
    pub fn tag(&self) -> &'static str {
        match self {
            Instruction::Call { .. } => "call",
            Instruction::Branch { .. } => "branch",
            Instruction::Jump { .. } => "jump",
            Instruction::Action(_) => "action",
        }
    }

    pub fn is_terminator(&self) -> bool {
        !matches!(self, Instruction::Call { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    /// Human-readable label (`entry`, `then.0`, `join.1`, ...).
    pub label: String,
    pub instructions: Vec<Instruction>,
}

// ── Functions & modules ──────────────────────────────────────────────────────

/// Governance metadata attached to a function, never to its blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceMetadata {
    pub category: GovernanceCategory,
    pub priority: i64,
    /// False when the priority was assigned from declaration order.
    pub explicit_priority: bool,
}

/// A compiled policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunction {
    /// Unique, stable policy identifier.
    pub id: String,
    pub governance: GovernanceMetadata,
    pub entry: BlockId,
    pub blocks: Vec<BasicBlock>,
    /// Number of temporaries the hoisted calls write to.
    pub temp_count: u32,
    /// Source line of the `policy` keyword.
    pub line: usize,
}

impl IrFunction {
    pub fn category(&self) -> GovernanceCategory {
        self.governance.category
    }

    pub fn priority(&self) -> i64 {
        self.governance.priority
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0 as usize).filter(|b| b.id == id)
    }

    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.block(self.entry)
    }

    /// Every action instruction in the function, in block order.
    pub fn actions(&self) -> impl Iterator<Item = &IrAction> {
        self.blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .filter_map(|i| match i {
                Instruction::Action(a) => Some(a),
                _ => None,
            })
    }

    pub fn can_emit(&self, action: ActionType) -> bool {
        self.actions().any(|a| a.action == action)
    }

    /// Targets of every `route to` action.
    pub fn route_targets(&self) -> impl Iterator<Item = &str> {
        self.actions()
            .filter(|a| a.action == ActionType::Route)
            .filter_map(|a| a.target.as_deref())
    }

    /// Tags of the first `depth` instructions of the entry block.
    pub fn condition_signature(&self, depth: usize) -> Vec<&'static str> {
        self.entry_block()
            .map(|b| b.instructions.iter().take(depth).map(Instruction::tag).collect())
            .unwrap_or_default()
    }

    /// Highest-precedence action the function can emit, if any.
    pub fn strongest_action(&self) -> Option<ActionType> {
        self.actions().map(|a| a.action).max_by_key(|a| a.precedence())
    }
}

/// Ordered mapping from policy identifier to compiled function.
///
/// Declaration order is preserved; it is the tie-breaker everywhere an
/// ordering among policies is needed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrModule {
    pub functions: Vec<IrFunction>,
}

impl IrModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut IrFunction> {
        self.functions.iter_mut().find(|f| f.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IrFunction> {
        self.functions.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|f| f.id.as_str())
    }
}
