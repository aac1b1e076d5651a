//! Core trait definitions for the PLang execution pipeline.
//!
//! Two seams separate the executor from its collaborators:
//!
//! - `PolicyInterpreter`: runs one compiled policy against a context
//! - `IntentValidator`: applies the per-type validation rules to intents
//!
//! The DAG executor drives both. It never interprets IR itself and never
//! decides on its own whether an intent is well-formed.

use plang_contracts::{
    context::ExecutionContext,
    error::PlangResult,
    execution::ExecutionResult,
    intent::Intent,
    ir::IrFunction,
};

use crate::intents::IntentSystem;

/// Executes a single policy function.
///
/// Implementations must be deterministic: identical `(function,
/// ctx.variables)` inputs must yield identical actions and intents.
pub trait PolicyInterpreter: Send + Sync {
    /// Run `function` against `ctx`, creating and emitting intents through
    /// `intents`.
    ///
    /// An `Err` fails this policy only. The executor records it and carries
    /// on with the next policy.
    fn execute(
        &self,
        function: &IrFunction,
        ctx: &mut ExecutionContext,
        intents: &mut IntentSystem<'_>,
    ) -> PlangResult<ExecutionResult>;
}

/// Validates intents before emission.
///
/// Validation is total: every intent type has a rule, even if the rule
/// accepts everything.
pub trait IntentValidator: Send + Sync {
    /// Return every rule violation. An empty vector means valid.
    fn validate(&self, intent: &Intent) -> Vec<String>;
}
