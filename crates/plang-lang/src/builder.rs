//! Lowering from AST to IR.
//!
//! Each `PolicyDecl` becomes exactly one `IrFunction`:
//!
//! - an action statement becomes an `Action` instruction and ends its block;
//! - `when c then A else B` becomes a `Branch` over two fresh blocks, with a
//!   `join` block that receives control when either side falls through;
//! - builtin calls whose evaluation is unconditional are hoisted out of the
//!   condition into `Call` instructions writing temporaries. Calls on the
//!   right of `and`/`or` stay inline so short-circuiting is preserved.
//!
//! A block left without a terminator falls through to the implicit default
//! ALLOW. The builder performs no semantic checks beyond that structure.

use tracing::debug;

use plang_contracts::{
    ir::{
        BasicBlock, BlockId, Expr, GovernanceMetadata, Instruction, IrAction, IrFunction,
        IrModule, TempId,
    },
};

use crate::ast::{ActionStmt, Ast, PolicyDecl, Statement};

/// Lower a parsed program into an IR module, preserving declaration order.
///
/// Policies without an explicit priority receive their declaration index.
pub fn build(ast: &Ast) -> IrModule {
    let functions = ast
        .policies
        .iter()
        .enumerate()
        .map(|(index, decl)| FunctionBuilder::new(decl, index).finish())
        .collect();
    let module = IrModule { functions };
    debug!(functions = module.len(), "built IR module");
    module
}

struct FunctionBuilder<'a> {
    decl: &'a PolicyDecl,
    default_priority: i64,
    blocks: Vec<BasicBlock>,
    temp_count: u32,
    label_counter: u32,
}

impl<'a> FunctionBuilder<'a> {
    fn new(decl: &'a PolicyDecl, index: usize) -> Self {
        Self {
            decl,
            default_priority: index as i64,
            blocks: Vec::new(),
            temp_count: 0,
            label_counter: 0,
        }
    }

    fn finish(mut self) -> IrFunction {
        let entry = self.new_block("entry".to_string());
        let decl = self.decl;
        self.lower_body(&decl.body, entry);

        IrFunction {
            id: decl.name.clone(),
            governance: GovernanceMetadata {
                category: decl.category,
                priority: decl.priority.unwrap_or(self.default_priority),
                explicit_priority: decl.priority.is_some(),
            },
            entry,
            blocks: self.blocks,
            temp_count: self.temp_count,
            line: decl.line,
        }
    }

    fn new_block(&mut self, label: String) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock { id, label, instructions: Vec::new() });
        id
    }

    fn push(&mut self, block: BlockId, instruction: Instruction) {
        self.blocks[block.0 as usize].instructions.push(instruction);
    }

    /// Lower `stmts` starting in `current`.
    ///
    /// Returns the block control falls out of, or `None` when every path
    /// ended in an action.
    fn lower_body(&mut self, stmts: &[Statement], mut current: BlockId) -> Option<BlockId> {
        for (index, stmt) in stmts.iter().enumerate() {
            match stmt {
                Statement::Action(action) => {
                    self.push(current, Instruction::Action(lower_action(action)));
                    if index + 1 < stmts.len() {
                        debug!(
                            policy = %self.decl.name,
                            line = action.line,
                            skipped = stmts.len() - index - 1,
                            "statements after an unconditional action are unreachable"
                        );
                    }
                    return None;
                }
                Statement::When { condition, then_body, else_body, .. } => {
                    let condition = self.hoist_calls(condition, current);
                    let n = self.label_counter;
                    self.label_counter += 1;

                    let then_block = self.new_block(format!("then.{}", n));
                    let else_block = else_body
                        .as_ref()
                        .map(|_| self.new_block(format!("else.{}", n)));
                    let join = self.new_block(format!("join.{}", n));

                    self.push(
                        current,
                        Instruction::Branch {
                            condition,
                            then_block,
                            else_block: else_block.unwrap_or(join),
                        },
                    );

                    if let Some(open) = self.lower_body(then_body, then_block) {
                        self.push(open, Instruction::Jump { target: join });
                    }
                    if let (Some(body), Some(block)) = (else_body, else_block) {
                        if let Some(open) = self.lower_body(body, block) {
                            self.push(open, Instruction::Jump { target: join });
                        }
                    }

                    current = join;
                }
            }
        }
        Some(current)
    }

    /// Move unconditionally evaluated builtin calls into `Call` instructions
    /// appended to `block`, returning the rewritten condition.
    fn hoist_calls(&mut self, expr: &Expr, block: BlockId) -> Expr {
        match expr {
            Expr::Call { function, args } => {
                let args = args.iter().map(|a| self.hoist_calls(a, block)).collect();
                let dest = TempId(self.temp_count);
                self.temp_count += 1;
                self.push(block, Instruction::Call { function: *function, args, dest });
                Expr::Temp(dest)
            }
            // Only the left operand is always evaluated.
            Expr::And(lhs, rhs) => {
                Expr::And(Box::new(self.hoist_calls(lhs, block)), rhs.clone())
            }
            Expr::Or(lhs, rhs) => Expr::Or(Box::new(self.hoist_calls(lhs, block)), rhs.clone()),
            Expr::Not(inner) => Expr::Not(Box::new(self.hoist_calls(inner, block))),
            Expr::Compare { op, lhs, rhs } => Expr::Compare {
                op: *op,
                lhs: Box::new(self.hoist_calls(lhs, block)),
                rhs: Box::new(self.hoist_calls(rhs, block)),
            },
            Expr::List(items) => {
                Expr::List(items.iter().map(|i| self.hoist_calls(i, block)).collect())
            }
            Expr::Literal(_) | Expr::Path(_) | Expr::Temp(_) => expr.clone(),
        }
    }
}

fn lower_action(stmt: &ActionStmt) -> IrAction {
    IrAction {
        action: stmt.action,
        target: stmt.target.clone(),
        reason: stmt.reason.clone(),
    }
}
