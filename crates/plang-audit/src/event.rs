//! Sealed trace types.
//!
//! `SealedEvent` wraps one `TraceEvent` with its position in the chain and
//! the SHA-256 hashes that make tampering detectable. `SealedTrace` is the
//! whole evaluation, ready to be archived by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plang_contracts::{context::TraceEvent, governance::ActionType};

/// A single entry in the hash chain of one evaluation.
///
/// Changing any field, including the embedded event's data or timestamp,
/// invalidates `this_hash` and every later `prev_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedEvent {
    /// Position in the chain, starting at 0.
    pub sequence: u64,

    pub execution_id: String,

    pub event: TraceEvent,

    /// Hash of the previous entry, or `GENESIS_HASH` for the first.
    pub prev_hash: String,

    /// Hash over (execution_id, sequence, prev_hash, canonical JSON of event).
    pub this_hash: String,
}

impl SealedEvent {
    /// The `prev_hash` of the first entry in every chain.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// A sealed evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedTrace {
    pub execution_id: String,
    pub request_id: String,
    pub final_action: ActionType,

    /// Timestamp-free digest of the decision; equal across repeated
    /// evaluations of the same module and variables.
    pub decision_digest: String,

    /// Trace events in chain order.
    pub events: Vec<SealedEvent>,

    pub sealed_at: DateTime<Utc>,

    /// `this_hash` of the last entry. Empty when the trace had no events.
    pub terminal_hash: String,
}
