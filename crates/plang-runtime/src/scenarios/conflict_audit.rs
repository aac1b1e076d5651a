//! Scenario 3: Conflict Audit
//!
//! Compiles a policy set merged from three teams and reports every conflict
//! the resolver finds, then shows the activation gate at work:
//!
//!   1. The safety gate set is published as the running module
//!   2. Publishing the merged set is refused because its route cycle cannot
//!      be broken by removing one hand-off
//!   3. Requests keep evaluating against the safety gate set

use plang_contracts::{
    conflict::ConflictType,
    error::{PlangError, PlangResult},
};

use crate::config::RuntimeConfig;
use crate::pipeline::compile;
use crate::registry::ModuleRegistry;
use crate::scenarios::safety_gate::{base_request, SAFETY_GATE_POLICY};

// ── Policy source ─────────────────────────────────────────────────────────────

pub const CONFLICT_AUDIT_POLICY: &str = include_str!("../../policies/conflict_audit.plang");

/// Severity at and above which an unresolved conflict refuses activation.
pub const GATE_SEVERITY: u8 = 90;

// ── Scenario runner ───────────────────────────────────────────────────────────

/// Run Scenario 3: Conflict Audit.
pub fn run_scenario() -> PlangResult<()> {
    println!("=== Scenario 3: Conflict Audit ===");
    println!();

    // ── Report ────────────────────────────────────────────────────────────────

    let compiled = compile(CONFLICT_AUDIT_POLICY)?;
    println!(
        "  {} policies, {} conflict(s):",
        compiled.module.len(),
        compiled.conflicts.len()
    );
    for kind in [
        ConflictType::Circular,
        ConflictType::Category,
        ConflictType::Action,
        ConflictType::Priority,
    ] {
        for conflict in compiled.conflicts.iter().filter(|c| c.conflict_type == kind) {
            println!(
                "  [{:<8} {:>3}] {} ({})",
                conflict.conflict_type,
                conflict.severity,
                conflict.description,
                if conflict.resolved { "resolved" } else { "UNRESOLVED" }
            );
            if let Some(winner) = &conflict.winner {
                println!("                 winner: {}", winner);
            }
        }
    }
    println!();

    // ── Activation gate ───────────────────────────────────────────────────────

    let config = RuntimeConfig {
        blocking_severity: Some(GATE_SEVERITY),
        ..RuntimeConfig::default()
    };
    let registry = ModuleRegistry::new(config)?;
    registry.publish(SAFETY_GATE_POLICY)?;
    println!("  Active module: safety gate");

    match registry.publish(CONFLICT_AUDIT_POLICY) {
        Ok(_) => println!("  Merged set published (no blocking conflicts)"),
        Err(PlangError::Activation { reason }) => println!("  Merged set REFUSED: {}", reason),
        Err(other) => return Err(other),
    }

    let trace = registry.evaluate(base_request("req-after-refusal", "hello"))?;
    println!(
        "  Request after refusal: {} (policies seen: {})",
        trace.final_action.as_str().to_uppercase(),
        trace.policies_seen().join(", ")
    );
    println!();

    println!("  Scenario 3 complete.");
    println!();

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use plang_contracts::governance::ActionType;

    use super::*;

    fn conflicts_of(kind: ConflictType) -> Vec<plang_contracts::conflict::PolicyConflict> {
        compile(CONFLICT_AUDIT_POLICY)
            .unwrap()
            .conflicts
            .into_iter()
            .filter(|c| c.conflict_type == kind)
            .collect()
    }

    #[test]
    fn test_action_conflict_prefers_the_deny() {
        let action = conflicts_of(ConflictType::Action);
        let freeze = action
            .iter()
            .find(|c| c.involves("weekend_freeze") && c.involves("hotfix_window"))
            .unwrap();
        assert_eq!(freeze.winner.as_deref(), Some("weekend_freeze"));
    }

    #[test]
    fn test_shared_priority_is_reported() {
        let priority = conflicts_of(ConflictType::Priority);
        assert!(priority
            .iter()
            .any(|c| c.involves("weekend_freeze") && c.involves("hotfix_window")));
        assert!(priority.iter().all(|c| c.resolved));
    }

    #[test]
    fn test_custom_allow_against_safety_deny() {
        let category = conflicts_of(ConflictType::Category);
        let beta = category.iter().find(|c| c.involves("beta_open")).unwrap();
        assert!(beta.involves("beta_lockout"));
        assert_eq!(beta.winner.as_deref(), Some("beta_lockout"));
    }

    #[test]
    fn test_intake_cycle_cannot_be_verified() {
        let circular = conflicts_of(ConflictType::Circular);
        assert_eq!(circular.len(), 1);
        assert!(circular[0].involves("intake"));
        assert!(!circular[0].resolved);
    }

    #[test]
    fn test_gate_refuses_and_keeps_previous_module() {
        let config = RuntimeConfig {
            blocking_severity: Some(GATE_SEVERITY),
            ..RuntimeConfig::default()
        };
        let registry = ModuleRegistry::new(config).unwrap();
        registry.publish(SAFETY_GATE_POLICY).unwrap();

        assert!(matches!(
            registry.publish(CONFLICT_AUDIT_POLICY),
            Err(PlangError::Activation { .. })
        ));
        let trace = registry.evaluate(base_request("r", "hello")).unwrap();
        assert_eq!(trace.final_action, ActionType::Route);
        assert!(trace.policies_seen().contains(&"default_route"));
    }

    #[test]
    fn test_scenario_runs() {
        run_scenario().unwrap();
    }
}
