//! Execution plans, per-policy results, and evaluation traces.
//!
//! `ExecutionPlan` is derived once per module and reused read-only across
//! evaluations. `ExecutionResult` is what the engine returns for one policy;
//! `ExecutionTrace` is what the DAG executor returns for a whole evaluation.

use serde::{Deserialize, Serialize};

use crate::context::{ExecutionId, ExecutionStatus, TraceEvent};
use crate::governance::{ActionType, GovernanceCategory};
use crate::intent::Intent;

/// All policies of one governance category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub category: GovernanceCategory,
    /// Policy identifiers in declaration order.
    pub policies: Vec<String>,
}

/// Stages in category-precedence order. Empty categories are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub stages: Vec<Stage>,
}

impl ExecutionPlan {
    pub fn policy_count(&self) -> usize {
        self.stages.iter().map(|s| s.policies.len()).sum()
    }

    pub fn stage(&self, category: GovernanceCategory) -> Option<&Stage> {
        self.stages.iter().find(|s| s.category == category)
    }
}

/// Outcome of executing one policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub policy: String,
    pub success: bool,
    pub action: ActionType,
    /// True when no action instruction fired and the default ALLOW applied.
    pub implicit: bool,
    pub target: Option<String>,
    pub intents: Vec<Intent>,
    /// Events this policy appended to the context trace.
    pub trace: Vec<TraceEvent>,
    pub steps: u64,
}

/// Per-category observability counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceCounters {
    pub safety_checks_passed: u64,
    pub privacy_checks_passed: u64,
    pub operational_checks_passed: u64,
    pub routing_checks_passed: u64,
    pub custom_checks_passed: u64,
    /// Policies whose execution failed and were treated as ALLOW.
    pub policies_failed: u64,
    /// Policies never reached because of early termination.
    pub policies_skipped: u64,
}

impl GovernanceCounters {
    /// Count one completed policy in `category`.
    pub fn record_pass(&mut self, category: GovernanceCategory) {
        match category {
            GovernanceCategory::Safety => self.safety_checks_passed += 1,
            GovernanceCategory::Privacy => self.privacy_checks_passed += 1,
            GovernanceCategory::Operational => self.operational_checks_passed += 1,
            GovernanceCategory::Routing => self.routing_checks_passed += 1,
            GovernanceCategory::Custom => self.custom_checks_passed += 1,
        }
    }

    pub fn passed(&self, category: GovernanceCategory) -> u64 {
        match category {
            GovernanceCategory::Safety => self.safety_checks_passed,
            GovernanceCategory::Privacy => self.privacy_checks_passed,
            GovernanceCategory::Operational => self.operational_checks_passed,
            GovernanceCategory::Routing => self.routing_checks_passed,
            GovernanceCategory::Custom => self.custom_checks_passed,
        }
    }
}

/// The complete result of one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub execution_id: ExecutionId,
    pub request_id: String,
    pub status: ExecutionStatus,
    pub final_action: ActionType,
    /// Policy whose DENY terminated the evaluation, if any.
    pub terminated_by: Option<String>,
    /// Emitted intents in emission order.
    pub intents: Vec<Intent>,
    pub trace_events: Vec<TraceEvent>,
    pub governance_counters: GovernanceCounters,
    /// Steps consumed across every policy of the evaluation.
    pub total_steps: u64,
}

impl ExecutionTrace {
    pub fn terminated_early(&self) -> bool {
        self.terminated_by.is_some()
    }

    /// Policies that appear in the trace, in first-appearance order.
    pub fn policies_seen(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for event in &self.trace_events {
            if let Some(p) = event.policy.as_deref() {
                if !seen.contains(&p) {
                    seen.push(p);
                }
            }
        }
        seen
    }
}
