//! Hash-chain primitives: sealing, verification and decision digests.
//!
//! Hash input layout for one entry (bytes, in order):
//!   1. execution_id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. compact JSON of the trace event
//!
//! The decision digest covers only `final_action` and the emitted intents.
//! Trace timestamps and execution ids are left out, so two evaluations of
//! the same module against the same variables produce the same digest.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use plang_contracts::{
    context::TraceEvent,
    error::{PlangError, PlangResult},
    execution::ExecutionTrace,
    governance::ActionType,
    intent::Intent,
};

use crate::event::{SealedEvent, SealedTrace};

fn to_json(value: &impl serde::Serialize, what: &str) -> PlangResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| PlangError::InvalidState {
        reason: format!("cannot serialize {} for hashing: {}", what, e),
    })
}

/// SHA-256 of one chain entry as lowercase hex.
pub fn hash_event(
    execution_id: &str,
    sequence: u64,
    event: &TraceEvent,
    prev_hash: &str,
) -> PlangResult<String> {
    let event_json = to_json(event, "trace event")?;

    let mut hasher = Sha256::new();
    hasher.update(execution_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&event_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Check prev-hash linkage and recompute every `this_hash`.
///
/// An empty chain is valid. Entries whose sequence does not match their
/// position fail verification.
pub fn verify_chain(events: &[SealedEvent]) -> bool {
    let mut expected_prev = SealedEvent::GENESIS_HASH.to_string();

    for (position, entry) in events.iter().enumerate() {
        if entry.sequence != position as u64 || entry.prev_hash != expected_prev {
            return false;
        }

        match hash_event(&entry.execution_id, entry.sequence, &entry.event, &entry.prev_hash) {
            Ok(recomputed) if recomputed == entry.this_hash => {}
            _ => return false,
        }

        expected_prev = entry.this_hash.clone();
    }

    true
}

/// Timestamp-free SHA-256 over `(final_action, intents)`.
pub fn decision_digest(final_action: ActionType, intents: &[Intent]) -> PlangResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(final_action.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(to_json(&intents, "intents")?);
    Ok(hex::encode(hasher.finalize()))
}

/// Chain every event of `trace` and attach the decision digest.
pub fn seal_trace(trace: &ExecutionTrace) -> PlangResult<SealedTrace> {
    let execution_id = trace.execution_id.0.to_string();
    let mut events: Vec<SealedEvent> = Vec::with_capacity(trace.trace_events.len());
    let mut prev_hash = SealedEvent::GENESIS_HASH.to_string();

    for (sequence, event) in trace.trace_events.iter().enumerate() {
        let sequence = sequence as u64;
        let this_hash = hash_event(&execution_id, sequence, event, &prev_hash)?;
        events.push(SealedEvent {
            sequence,
            execution_id: execution_id.clone(),
            event: event.clone(),
            prev_hash: std::mem::replace(&mut prev_hash, this_hash.clone()),
            this_hash,
        });
    }

    let terminal_hash = events.last().map(|e| e.this_hash.clone()).unwrap_or_default();
    let digest = decision_digest(trace.final_action, &trace.intents)?;

    if events.is_empty() {
        warn!(execution_id = %execution_id, "sealing a trace with no events");
    }
    debug!(
        execution_id = %execution_id,
        events = events.len(),
        terminal_hash = %terminal_hash,
        "trace sealed"
    );

    Ok(SealedTrace {
        execution_id,
        request_id: trace.request_id.clone(),
        final_action: trace.final_action,
        decision_digest: digest,
        events,
        sealed_at: Utc::now(),
        terminal_hash,
    })
}
