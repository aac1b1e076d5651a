//! # plang-contracts
//!
//! Shared types, IR definitions, and error contracts for the PLang policy core.
//!
//! Every crate in the workspace imports from here. No business logic lives in
//! this crate. It holds data definitions, fixed precedence tables and the
//! error type.

pub mod conflict;
pub mod context;
pub mod error;
pub mod execution;
pub mod governance;
pub mod intent;
pub mod ir;
pub mod value;
