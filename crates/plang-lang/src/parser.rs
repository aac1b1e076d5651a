//! Recursive-descent parser for PLang.
//!
//! Grammar (informal):
//!
//! ```text
//! program   := policy*
//! policy    := "policy" IDENT ":" CATEGORY ("priority" INT)? "{" stmt* "}"
//! stmt      := "when" expr "then" branch ("else" branch)? | action
//! branch    := action | "{" stmt* "}"
//! action    := "allow"
//!            | "deny" STRING?
//!            | "route" "to" (IDENT | STRING)
//!            | "escalate" ("to" (IDENT | STRING))? STRING?
//! expr      := and ("or" and)*
//! and       := unary ("and" unary)*
//! unary     := "not" unary | cmp
//! cmp       := primary (("==" | "!=" | "<" | "<=" | ">" | ">=") primary)?
//! primary   := literal | "[" (expr ("," expr)*)? "]" | "(" expr ")"
//!            | BUILTIN "(" args ")" | IDENT ("." IDENT)*
//! ```
//!
//! `;` may separate statements and is otherwise ignored. Parsing is
//! all-or-nothing: the first error aborts with `PlangError::Parse`.
//!
//! Expression trees and nested `{ }` branches are capped at
//! [`MAX_NESTING`] levels. Every `and`/`or` operand after the first counts
//! as a level, since the chain is built as a left-nested tree.

use std::collections::HashSet;

use tracing::debug;

use plang_contracts::{
    error::{PlangError, PlangResult},
    governance::{ActionType, GovernanceCategory},
    ir::{Builtin, CompareOp, Expr},
    value::Value,
};

use crate::ast::{ActionStmt, Ast, PolicyDecl, Statement};
use crate::lexer::{tokenize, Token, TokenKind};

/// Deepest expression or branch nesting the parser accepts.
pub const MAX_NESTING: usize = 128;

/// Parse PLang source into an AST.
pub fn parse(source: &str) -> PlangResult<Ast> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let ast = parser.parse_program()?;
    debug!(policies = ast.policies.len(), "parsed policy source");
    Ok(ast)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    // ── Declarations ─────────────────────────────────────────────────────────

    fn parse_program(&mut self) -> PlangResult<Ast> {
        let mut policies = Vec::new();
        let mut names = HashSet::new();

        loop {
            self.skip_separators();
            if self.check(&TokenKind::Eof) {
                break;
            }
            let decl = self.parse_policy()?;
            if !names.insert(decl.name.clone()) {
                return Err(PlangError::Parse {
                    line: decl.line,
                    message: format!("duplicate policy name '{}'", decl.name),
                });
            }
            policies.push(decl);
        }

        Ok(Ast { policies })
    }

    fn parse_policy(&mut self) -> PlangResult<PolicyDecl> {
        let line = self.current().line;
        self.expect(TokenKind::Policy)?;
        let name = self.expect_identifier("policy name")?;
        self.expect(TokenKind::Colon)?;

        let category_line = self.current().line;
        let category_word = self.expect_identifier("governance category")?;
        let category = GovernanceCategory::from_keyword(&category_word).ok_or_else(|| {
            PlangError::Parse {
                line: category_line,
                message: format!(
                    "unknown category '{}' (expected SAFETY, PRIVACY, OPERATIONAL, ROUTING or CUSTOM)",
                    category_word
                ),
            }
        })?;

        let priority = if self.eat(&TokenKind::Priority) {
            match self.current().kind.clone() {
                TokenKind::Int(value) => {
                    self.advance();
                    Some(value)
                }
                _ => return Err(self.error("expected integer after 'priority'")),
            }
        } else {
            None
        };

        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block_body()?;

        Ok(PolicyDecl { name, category, priority, body, line })
    }

    /// Statements up to and including the closing `}`.
    fn parse_block_body(&mut self) -> PlangResult<Vec<Statement>> {
        let mut body = Vec::new();
        loop {
            self.skip_separators();
            if self.eat(&TokenKind::RBrace) {
                return Ok(body);
            }
            if self.check(&TokenKind::Eof) {
                return Err(self.error("expected '}' before end of input"));
            }
            body.push(self.parse_statement()?);
        }
    }

    // ── Statements ───────────────────────────────────────────────────────────

    fn parse_statement(&mut self) -> PlangResult<Statement> {
        let line = self.current().line;
        if self.eat(&TokenKind::When) {
            let condition = self.parse_expr()?;
            self.expect(TokenKind::Then)?;
            let then_body = self.parse_branch()?;
            let else_body = if self.eat(&TokenKind::Else) {
                Some(self.parse_branch()?)
            } else {
                None
            };
            return Ok(Statement::When { condition, then_body, else_body, line });
        }
        self.parse_action().map(Statement::Action)
    }

    fn parse_branch(&mut self) -> PlangResult<Vec<Statement>> {
        if self.eat(&TokenKind::LBrace) {
            let depth = self.depth;
            self.descend("block")?;
            let body = self.parse_block_body()?;
            self.depth = depth;
            Ok(body)
        } else {
            Ok(vec![Statement::Action(self.parse_action()?)])
        }
    }

    fn parse_action(&mut self) -> PlangResult<ActionStmt> {
        let line = self.current().line;
        match self.current().kind.clone() {
            TokenKind::Allow => {
                self.advance();
                Ok(ActionStmt { action: ActionType::Allow, target: None, reason: None, line })
            }
            TokenKind::Deny => {
                self.advance();
                let reason = self.eat_string();
                Ok(ActionStmt { action: ActionType::Deny, target: None, reason, line })
            }
            TokenKind::Route => {
                self.advance();
                self.expect(TokenKind::To)?;
                let target = self.expect_target()?;
                Ok(ActionStmt { action: ActionType::Route, target: Some(target), reason: None, line })
            }
            TokenKind::Escalate => {
                self.advance();
                let target = if self.eat(&TokenKind::To) {
                    Some(self.expect_target()?)
                } else {
                    None
                };
                let reason = self.eat_string();
                Ok(ActionStmt { action: ActionType::Escalate, target, reason, line })
            }
            other => Err(self.error(&format!(
                "expected 'when', 'allow', 'deny', 'route' or 'escalate', found {}",
                other.describe()
            ))),
        }
    }

    // ── Expressions ──────────────────────────────────────────────────────────

    fn parse_expr(&mut self) -> PlangResult<Expr> {
        let depth = self.depth;
        self.descend("expression")?;
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            self.descend("expression")?;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PlangResult<Expr> {
        let depth = self.depth;
        let mut lhs = self.parse_unary()?;
        while self.eat(&TokenKind::And) {
            self.descend("expression")?;
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PlangResult<Expr> {
        if self.eat(&TokenKind::Not) {
            let depth = self.depth;
            self.descend("expression")?;
            let inner = self.parse_unary()?;
            self.depth = depth;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PlangResult<Expr> {
        let lhs = self.parse_primary()?;
        let op = match self.current().kind {
            TokenKind::EqEq => CompareOp::Eq,
            TokenKind::NotEq => CompareOp::Ne,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Le => CompareOp::Le,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Ge => CompareOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_primary()?;
        Ok(Expr::Compare { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    fn parse_primary(&mut self) -> PlangResult<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Value::Str(s)))
            }
            TokenKind::Int(i) => {
                self.advance();
                Ok(Expr::Literal(Value::Int(i)))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Literal(Value::Float(f)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal(Value::Null))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let items = self.parse_comma_list(TokenKind::RBracket)?;
                Ok(Expr::List(items))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    return self.parse_call(&name, token.line);
                }
                let mut segments = vec![name];
                while self.eat(&TokenKind::Dot) {
                    segments.push(self.expect_path_segment()?);
                }
                Ok(Expr::Path(segments))
            }
            other => Err(self.error(&format!("expected expression, found {}", other.describe()))),
        }
    }

    fn parse_call(&mut self, name: &str, line: usize) -> PlangResult<Expr> {
        let function = Builtin::from_name(name).ok_or_else(|| PlangError::Parse {
            line,
            message: format!(
                "unknown function '{}' (available: contains, len, is_empty)",
                name
            ),
        })?;
        self.expect(TokenKind::LParen)?;
        let args = self.parse_comma_list(TokenKind::RParen)?;
        if args.len() != function.arity() {
            return Err(PlangError::Parse {
                line,
                message: format!(
                    "function '{}' takes {} argument(s), got {}",
                    name,
                    function.arity(),
                    args.len()
                ),
            });
        }
        Ok(Expr::Call { function, args })
    }

    /// Comma-separated expressions up to and including `close`.
    fn parse_comma_list(&mut self, close: TokenKind) -> PlangResult<Vec<Expr>> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            if self.eat(&close) {
                return Ok(items);
            }
            self.expect(TokenKind::Comma)?;
        }
    }

    // ── Token helpers ────────────────────────────────────────────────────────

    fn current(&self) -> &Token {
        // The token stream always ends with Eof and we never advance past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if !self.check(&TokenKind::Eof) {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_string(&mut self) -> Option<String> {
        match self.current().kind.clone() {
            TokenKind::Str(s) => {
                self.advance();
                Some(s)
            }
            _ => None,
        }
    }

    fn skip_separators(&mut self) {
        while self.eat(&TokenKind::Semicolon) {}
    }

    fn expect(&mut self, kind: TokenKind) -> PlangResult<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(&format!(
                "expected {}, found {}",
                kind.describe(),
                self.current().kind.describe()
            )))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> PlangResult<String> {
        match self.current().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(&format!("expected {}, found {}", what, other.describe()))),
        }
    }

    /// Route and escalation targets: a bare identifier or a string.
    fn expect_target(&mut self) -> PlangResult<String> {
        match self.current().kind.clone() {
            TokenKind::Ident(name) | TokenKind::Str(name) if !name.is_empty() => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(&format!("expected target, found {}", other.describe()))),
        }
    }

    /// Segments after a `.` may reuse keyword spellings (`request.priority`).
    fn expect_path_segment(&mut self) -> PlangResult<String> {
        let kind = self.current().kind.clone();
        let segment = match &kind {
            TokenKind::Ident(name) => name.clone(),
            other if other.symbol().chars().all(|c| c.is_ascii_alphabetic())
                && !other.symbol().is_empty() =>
            {
                other.symbol().to_string()
            }
            other => {
                return Err(self.error(&format!("expected field name, found {}", other.describe())))
            }
        };
        self.advance();
        Ok(segment)
    }

    /// Enter one nesting level, failing past `MAX_NESTING`.
    fn descend(&mut self, what: &str) -> PlangResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(&format!("{} nested too deeply", what)));
        }
        Ok(())
    }

    fn error(&self, message: &str) -> PlangError {
        PlangError::Parse {
            line: self.current().line,
            message: message.to_string(),
        }
    }
}
