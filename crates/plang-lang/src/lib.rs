//! # plang-lang
//!
//! The PLang front end: tokenizer, recursive-descent parser, and the lowering
//! from AST to the IR defined in `plang-contracts`.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use plang_lang::{parse, build};
//!
//! let ast = parse("policy block_all: SAFETY { deny \"maintenance\" }")?;
//! let module = build(&ast);
//! assert_eq!(module.len(), 1);
//! ```
//!
//! ## Vocabulary
//!
//! Categories (`SAFETY`, `PRIVACY`, `OPERATIONAL`, `ROUTING`, `CUSTOM`),
//! actions (`allow`, `deny`, `route to`, `escalate`) and builtins
//! (`contains`, `len`, `is_empty`) form a closed set. Anything else is a
//! parse error.

pub mod ast;
pub mod builder;
pub mod lexer;
pub mod parser;

pub use ast::{ActionStmt, Ast, PolicyDecl, Statement};
pub use builder::build;
pub use parser::{parse, MAX_NESTING};
