//! Scenario 2: Expert Routing
//!
//! Two specialist desks hand requests to each other, which puts a cycle in
//! the route graph. The scenario:
//!
//!   1. Compiles the set as written and prints the CIRCULAR conflict with its
//!      verified break
//!   2. Publishes it through a `ModuleRegistry` configured with
//!      `break_cycles = true`, which rewrites the losing hand-off into ALLOW
//!   3. Evaluates a cardiology request asking for a second opinion against
//!      the published module
//!   4. Shows the PRIVACY stage refusing a patient lookup without consent

use plang_contracts::{conflict::ConflictType, error::PlangResult, execution::ExecutionTrace};

use crate::config::RuntimeConfig;
use crate::pipeline::{compile, EvaluationRequest};
use crate::registry::ModuleRegistry;

// ── Policy source ─────────────────────────────────────────────────────────────

pub const EXPERT_ROUTING_POLICY: &str = include_str!("../../policies/expert_routing.plang");

/// A cardiology request with patient consent on file.
pub fn cardiology_request(request_id: &str, second_opinion: bool) -> EvaluationRequest {
    EvaluationRequest::new(request_id)
        .with_user("dr-hansen")
        .with_variable("domain", "cardiology")
        .with_variable("second_opinion", second_opinion)
        .with_variable("patient_id", "P-3321")
        .with_variable("consent", true)
}

fn print_routes(trace: &ExecutionTrace) {
    for intent in &trace.intents {
        let target = intent
            .payload_str("target_agent")
            .or_else(|| intent.payload_str("reason"))
            .unwrap_or("-");
        println!(
            "    {:<16} {:<9} {}",
            intent.source_policy.as_deref().unwrap_or("-"),
            intent.intent_type.to_string(),
            target
        );
    }
}

// ── Scenario runner ───────────────────────────────────────────────────────────

/// Run Scenario 2: Expert Routing.
pub fn run_scenario() -> PlangResult<()> {
    println!("=== Scenario 2: Expert Routing ===");
    println!();

    // ── Static analysis of the set as written ─────────────────────────────────

    let as_written = compile(EXPERT_ROUTING_POLICY)?;
    for conflict in as_written.conflicts.iter().filter(|c| c.conflict_type == ConflictType::Circular) {
        println!("  {} (severity {})", conflict.description, conflict.severity);
        println!(
            "  Resolution:  {} [{}]",
            conflict.resolution.as_deref().unwrap_or("-"),
            if conflict.resolved { "VERIFIED" } else { "UNVERIFIED" }
        );
    }
    println!();

    // ── Publish with cycle breaking enabled ───────────────────────────────────

    let config = RuntimeConfig {
        break_cycles: true,
        blocking_severity: Some(100),
        ..RuntimeConfig::default()
    };
    let registry = ModuleRegistry::new(config)?;
    let published = registry.publish(EXPERT_ROUTING_POLICY)?;
    println!(
        "  Published {} policies with break_cycles = true",
        published.module.len()
    );
    println!();

    // ── Evaluate ──────────────────────────────────────────────────────────────

    println!("  Request: cardiology, second opinion requested");
    let trace = registry.evaluate(cardiology_request("req-cardio-2nd", true))?;
    println!("  Final action: {}", trace.final_action.as_str().to_uppercase());
    print_routes(&trace);
    println!();

    println!("  Request: cardiology patient lookup without consent");
    let trace = registry.evaluate(
        cardiology_request("req-no-consent", false).with_variable("consent", false),
    )?;
    println!(
        "  Final action: {} (terminated by {})",
        trace.final_action.as_str().to_uppercase(),
        trace.terminated_by.as_deref().unwrap_or("-")
    );
    print_routes(&trace);
    println!();

    println!("  Scenario 2 complete.");
    println!();

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
