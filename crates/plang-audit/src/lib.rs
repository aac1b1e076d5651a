//! # plang-audit
//!
//! Tamper-evident sealing of PLang execution traces.
//!
//! ## Overview
//!
//! `seal_trace` wraps every `TraceEvent` of an `ExecutionTrace` in a
//! `SealedEvent` linked to its predecessor by SHA-256. Changing any byte of
//! any event breaks the chain, and `verify_chain` detects it.
//!
//! `decision_digest` is the determinism check: it hashes only the final
//! action and the emitted intents, so identical inputs give identical
//! digests no matter when they ran.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use plang_audit::{seal_trace, verify_chain};
//!
//! let sealed = seal_trace(&trace)?;
//! assert!(verify_chain(&sealed.events));
//! ```

pub mod chain;
pub mod event;

pub use chain::{decision_digest, hash_event, seal_trace, verify_chain};
pub use event::{SealedEvent, SealedTrace};

// ── Tests ─────────────────────────────────────────────────────────────────────
