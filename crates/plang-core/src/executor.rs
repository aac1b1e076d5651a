//! The DAG executor: staged, category-ordered evaluation of a whole module.
//!
//! Stages run strictly `SAFETY -> PRIVACY -> OPERATIONAL -> ROUTING -> CUSTOM`.
//! Within a stage policies run in declaration order. Two rules shape the walk:
//!
//! - A DENY ends the evaluation at once. No later policy, in this stage or
//!   any other, is executed or traced.
//! - An error in one policy fails that policy only. It is recorded as a
//!   `policy_failed` event and the policy counts as ALLOW (fail-open).
//!
//! The module and plan are only ever borrowed, so one compiled module can
//! serve any number of concurrent evaluations.

use std::fmt::Write as _;

use serde_json::json;
use tracing::{debug, info, warn};

use plang_contracts::{
    context::{ExecutionContext, TraceEventKind},
    error::{PlangError, PlangResult},
    execution::{ExecutionPlan, ExecutionTrace, GovernanceCounters, Stage},
    governance::{ActionType, GovernanceCategory},
    ir::IrModule,
};

use crate::intents::IntentSystem;
use crate::traits::{IntentValidator, PolicyInterpreter};

// ── Planning ─────────────────────────────────────────────────────────────────

/// Group the module's policies into one stage per non-empty category.
pub fn build_plan(module: &IrModule) -> ExecutionPlan {
    let stages: Vec<Stage> = GovernanceCategory::ALL
        .iter()
        .filter_map(|&category| {
            let policies: Vec<String> = module
                .iter()
                .filter(|f| f.category() == category)
                .map(|f| f.id.clone())
                .collect();
            (!policies.is_empty()).then_some(Stage { category, policies })
        })
        .collect();

    debug!(
        stages = stages.len(),
        policies = module.len(),
        "built execution plan"
    );
    ExecutionPlan { stages }
}

/// Render a plan as indented text for operators.
pub fn visualize_plan(module: &IrModule, plan: &ExecutionPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Execution plan: {} policies in {} stages",
        plan.policy_count(),
        plan.stages.len()
    );

    for (index, stage) in plan.stages.iter().enumerate() {
        let _ = writeln!(
            out,
            "[{}] {} (precedence {})",
            index + 1,
            stage.category,
            stage.category.precedence()
        );
        for (position, id) in stage.policies.iter().enumerate() {
            let branch = if position + 1 == stage.policies.len() { "└─" } else { "├─" };
            match module.get(id) {
                Some(function) => {
                    let mut actions: Vec<&str> = Vec::new();
                    for action in function.actions() {
                        let name = action.action.as_str();
                        if !actions.contains(&name) {
                            actions.push(name);
                        }
                    }
                    let actions = if actions.is_empty() {
                        "default allow".to_string()
                    } else {
                        actions.join(", ")
                    };
                    let _ = writeln!(
                        out,
                        "    {} {} (priority {}) -> {}",
                        branch,
                        id,
                        function.priority(),
                        actions
                    );
                }
                None => {
                    let _ = writeln!(out, "    {} {} (missing from module)", branch, id);
                }
            }
        }
        if index + 1 < plan.stages.len() {
            let _ = writeln!(out, "     │ deny stops here");
        }
    }
    out
}

// ── Execution ────────────────────────────────────────────────────────────────

/// Walks an `ExecutionPlan`, delegating each policy to a `PolicyInterpreter`.
pub struct DagExecutor {
    interpreter: Box<dyn PolicyInterpreter>,
    validator: Box<dyn IntentValidator>,
}

impl DagExecutor {
    pub fn new(
        interpreter: Box<dyn PolicyInterpreter>,
        validator: Box<dyn IntentValidator>,
    ) -> Self {
        Self { interpreter, validator }
    }

    /// Evaluate `plan` over `module` for one request.
    ///
    /// `ctx` must be `Pending`; it is `Completed` on return. Per-policy
    /// failures never surface as `Err`. An `Err` means the call itself was
    /// malformed: a context that was already used, or a plan naming a policy
    /// the module does not contain.
    pub fn execute(
        &self,
        module: &IrModule,
        plan: &ExecutionPlan,
        ctx: &mut ExecutionContext,
    ) -> PlangResult<ExecutionTrace> {
        ctx.start()?;
        info!(
            execution_id = %ctx.execution_id.0,
            request_id = %ctx.request_id,
            stages = plan.stages.len(),
            "evaluation starting"
        );

        let mut intents = IntentSystem::new(self.validator.as_ref());
        let mut counters = GovernanceCounters::default();
        let mut final_action = ActionType::Allow;
        let mut terminated_by: Option<String> = None;
        let mut total_steps = 0u64;

        'stages: for (stage_index, stage) in plan.stages.iter().enumerate() {
            ctx.record(
                TraceEventKind::StageEnter,
                None,
                json!({ "category": stage.category.as_str(), "policies": stage.policies.len() }),
            );
            debug!(category = %stage.category, policies = stage.policies.len(), "stage starting");

            for (position, id) in stage.policies.iter().enumerate() {
                let Some(function) = module.get(id) else {
                    ctx.fail()?;
                    return Err(PlangError::UnknownPolicy { policy: id.clone() });
                };

                match self.interpreter.execute(function, ctx, &mut intents) {
                    Ok(result) => {
                        total_steps += result.steps;
                        counters.record_pass(stage.category);
                        if result.action.precedence() > final_action.precedence() {
                            final_action = result.action;
                        }

                        if result.action == ActionType::Deny {
                            let skipped = (stage.policies.len() - position - 1)
                                + plan.stages[stage_index + 1..]
                                    .iter()
                                    .map(|s| s.policies.len())
                                    .sum::<usize>();
                            counters.policies_skipped = skipped as u64;

                            ctx.record(
                                TraceEventKind::EarlyTermination,
                                Some(id),
                                json!({ "category": stage.category.as_str(), "skipped": skipped }),
                            );
                            ctx.record(
                                TraceEventKind::StageExit,
                                None,
                                json!({ "category": stage.category.as_str(), "terminated": true }),
                            );
                            info!(
                                policy = %id,
                                category = %stage.category,
                                skipped,
                                "deny, terminating evaluation"
                            );
                            terminated_by = Some(id.clone());
                            break 'stages;
                        }
                    }
                    Err(err) => {
                        total_steps += ctx.step_count;
                        counters.policies_failed += 1;
                        ctx.call_stack.clear();
                        warn!(
                            policy = %id,
                            category = %stage.category,
                            error = %err,
                            "policy failed, treating as allow"
                        );
                        ctx.record(
                            TraceEventKind::PolicyFailed,
                            Some(id),
                            json!({ "error": err.to_string(), "fallback": "allow" }),
                        );
                    }
                }
            }

            ctx.record(
                TraceEventKind::StageExit,
                None,
                json!({ "category": stage.category.as_str(), "terminated": false }),
            );
        }

        ctx.complete()?;
        info!(
            execution_id = %ctx.execution_id.0,
            final_action = final_action.as_str(),
            intents = intents.emitted().len(),
            failed = counters.policies_failed,
            "evaluation complete"
        );

        Ok(ExecutionTrace {
            execution_id: ctx.execution_id.clone(),
            request_id: ctx.request_id.clone(),
            status: ctx.status,
            final_action,
            terminated_by,
            intents: intents.into_emitted(),
            trace_events: ctx.trace.clone(),
            governance_counters: counters,
            total_steps,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
