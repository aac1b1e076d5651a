//! The operations the policy core exposes to its caller.
//!
//! - `compile`: source text to a resolved module, its plan and its conflicts
//! - `evaluate`: one request against a compiled module
//! - `get_execution_plan` / `visualize_plan`: introspection
//!
//! A `CompiledModule` is immutable once built. Its module and plan sit behind
//! `Arc`, so evaluations on many threads can share one compilation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use plang_contracts::{
    conflict::PolicyConflict,
    context::ExecutionContext,
    error::PlangResult,
    execution::{ExecutionPlan, ExecutionTrace},
    ir::IrModule,
    value::Value,
};
use plang_core::{apply_cycle_breaks, build_plan, ConflictResolver, DagExecutor, DeterministicEngine};
use plang_intent::SchemaIntentValidator;

use crate::config::RuntimeConfig;

// ── Compilation ──────────────────────────────────────────────────────────────

/// A parsed, built, resolved and planned policy set.
#[derive(Debug, Clone)]
pub struct CompiledModule {
    pub module: Arc<IrModule>,
    pub plan: Arc<ExecutionPlan>,
    pub conflicts: Vec<PolicyConflict>,
}

impl CompiledModule {
    /// Unresolved conflicts at or above `severity`.
    pub fn blocking_conflicts(&self, severity: u8) -> Vec<&PolicyConflict> {
        self.conflicts
            .iter()
            .filter(|c| !c.resolved && c.severity >= severity)
            .collect()
    }
}

/// Compile with the default configuration.
pub fn compile(source: &str) -> PlangResult<CompiledModule> {
    compile_with(source, &RuntimeConfig::default())
}

/// Parse, build, resolve and plan `source`.
///
/// Parse errors are the only failure. Conflicts never fail compilation; they
/// are returned alongside the module.
pub fn compile_with(source: &str, config: &RuntimeConfig) -> PlangResult<CompiledModule> {
    let ast = plang_lang::parse(source)?;
    let module = plang_lang::build(&ast);

    let resolution = ConflictResolver::new()
        .with_signature_depth(config.signature_depth)
        .resolve(module);
    let module = if config.break_cycles {
        apply_cycle_breaks(resolution.module, &resolution.conflicts)
    } else {
        resolution.module
    };

    let plan = build_plan(&module);
    info!(
        policies = module.len(),
        stages = plan.stages.len(),
        conflicts = resolution.conflicts.len(),
        break_cycles = config.break_cycles,
        "compiled policy set"
    );

    Ok(CompiledModule {
        module: Arc::new(module),
        plan: Arc::new(plan),
        conflicts: resolution.conflicts,
    })
}

// ── Evaluation ───────────────────────────────────────────────────────────────

/// The caller's view of one request needing a policy decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub request_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// Per-policy step budget; the runtime default applies when absent.
    #[serde(default)]
    pub max_steps: Option<u64>,
}

impl EvaluationRequest {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self { request_id: request_id.into(), ..Self::default() }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    fn into_context(self, default_max_steps: u64) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(self.request_id)
            .with_variables(self.variables)
            .with_max_steps(self.max_steps.unwrap_or(default_max_steps));
        ctx.user_id = self.user_id;
        ctx.agent_id = self.agent_id;
        ctx
    }
}

/// A DAG executor wired to the reference engine and validator.
///
/// Build one and reuse it; it holds no per-request state.
pub struct Evaluator {
    executor: DagExecutor,
    default_max_steps: u64,
}

impl Evaluator {
    pub fn new(config: &RuntimeConfig) -> PlangResult<Self> {
        let executor = DagExecutor::new(
            Box::new(DeterministicEngine::new()),
            Box::new(SchemaIntentValidator::new()?),
        );
        Ok(Self { executor, default_max_steps: config.max_steps })
    }

    pub fn evaluate(
        &self,
        compiled: &CompiledModule,
        request: EvaluationRequest,
    ) -> PlangResult<ExecutionTrace> {
        self.evaluate_with_plan(&compiled.module, &compiled.plan, request)
    }

    fn evaluate_with_plan(
        &self,
        module: &IrModule,
        plan: &ExecutionPlan,
        request: EvaluationRequest,
    ) -> PlangResult<ExecutionTrace> {
        debug!(request_id = %request.request_id, variables = request.variables.len(), "evaluating request");
        let mut ctx = request.into_context(self.default_max_steps);
        self.executor.execute(module, plan, &mut ctx)
    }
}

/// Evaluate one request against `module` with the default configuration.
///
/// Derives the plan on every call. Callers evaluating many requests should
/// compile once and use an `Evaluator` with the cached plan.
pub fn evaluate(module: &IrModule, request: EvaluationRequest) -> PlangResult<ExecutionTrace> {
    let plan = build_plan(module);
    Evaluator::new(&RuntimeConfig::default())?.evaluate_with_plan(module, &plan, request)
}

// ── Introspection ────────────────────────────────────────────────────────────

pub fn get_execution_plan(module: &IrModule) -> ExecutionPlan {
    build_plan(module)
}

pub fn visualize_plan(module: &IrModule) -> String {
    plang_core::visualize_plan(module, &build_plan(module))
}

#[cfg(test)]
mod tests {
    use plang_contracts::{
        conflict::ConflictType,
        error::PlangError,
        governance::{ActionType, GovernanceCategory},
        intent::IntentType,
    };
    use plang_audit::{decision_digest, seal_trace, verify_chain};

    use super::*;

    // ── compile ───────────────────────────────────────────────────────────────

    #[test]
    fn compile_returns_module_plan_and_conflicts() {
        let compiled = compile(
            r#"
            policy open: CUSTOM { allow }
            policy shut: SAFETY { deny }
            "#,
        )
        .unwrap();
        assert_eq!(compiled.module.len(), 2);
        assert_eq!(compiled.plan.stages[0].category, GovernanceCategory::Safety);

        let action = compiled
            .conflicts
            .iter()
            .find(|c| c.conflict_type == ConflictType::Action)
            .unwrap();
        assert_eq!(action.winner.as_deref(), Some("shut"));
        assert!(compiled.conflicts.iter().any(|c| c.conflict_type == ConflictType::Category));
    }

    #[test]
    fn compile_reports_parse_errors() {
        let err = compile("policy broken: SAFETY {").unwrap_err();
        assert!(matches!(err, PlangError::Parse { line: 1, .. }));
    }

    #[test]
    fn break_cycles_rewrites_routes_only_when_enabled() {
        let source = "policy a: ROUTING { route to b }\npolicy b: ROUTING { route to a }";

        let kept = compile(source).unwrap();
        assert_eq!(kept.module.get("a").unwrap().route_targets().count(), 1);

        let config = RuntimeConfig { break_cycles: true, ..RuntimeConfig::default() };
        let broken = compile_with(source, &config).unwrap();
        assert_eq!(broken.module.get("a").unwrap().route_targets().count(), 0);
        assert_eq!(broken.module.get("b").unwrap().route_targets().count(), 1);
    }

    // ── evaluate ──────────────────────────────────────────────────────────────

    #[test]
    fn evaluate_simple_deny() {
        let compiled = compile("policy gate: SAFETY { deny }").unwrap();
        let trace = evaluate(&compiled.module, EvaluationRequest::new("req-1")).unwrap();
        assert_eq!(trace.final_action, ActionType::Deny);
        assert!(trace.governance_counters.safety_checks_passed >= 1);
    }

    #[test]
    fn evaluate_conditional_route() {
        let compiled =
            compile(r#"policy r: ROUTING { when true then route to "expert_agent" }"#).unwrap();
        let evaluator = Evaluator::new(&RuntimeConfig::default()).unwrap();
        let trace = evaluator.evaluate(&compiled, EvaluationRequest::new("req-1")).unwrap();

        assert_eq!(trace.intents.len(), 1);
        assert_eq!(trace.intents[0].intent_type, IntentType::Route);
        assert_eq!(trace.intents[0].payload_str("target_agent"), Some("expert_agent"));
    }

    #[test]
    fn request_fields_reach_conditions() {
        let compiled = compile(
            r#"
            policy vip: ROUTING {
                when user.id == "u-42" and tier == "gold" then route to "priority_agent"
            }
            "#,
        )
        .unwrap();
        let evaluator = Evaluator::new(&RuntimeConfig::default()).unwrap();

        let request = EvaluationRequest::new("r")
            .with_user("u-42")
            .with_agent("front-desk")
            .with_variable("tier", "gold");
        let trace = evaluator.evaluate(&compiled, request).unwrap();
        assert_eq!(trace.final_action, ActionType::Route);
    }

    #[test]
    fn request_step_budget_overrides_config() {
        let mut body = String::new();
        for i in 0..8 {
            body.push_str(&format!("when n == {} then deny\n", 100 + i));
        }
        let compiled = compile(&format!("policy p: SAFETY {{ {} }}", body)).unwrap();
        let evaluator = Evaluator::new(&RuntimeConfig::default()).unwrap();

        let relaxed = evaluator
            .evaluate(&compiled, EvaluationRequest::new("r").with_variable("n", 1i64))
            .unwrap();
        assert_eq!(relaxed.governance_counters.policies_failed, 0);

        let tight = evaluator
            .evaluate(
                &compiled,
                EvaluationRequest::new("r").with_variable("n", 1i64).with_max_steps(4),
            )
            .unwrap();
        assert_eq!(tight.governance_counters.policies_failed, 1);
        assert_eq!(tight.final_action, ActionType::Allow);
    }

    #[test]
    fn request_deserializes_from_json() {
        let request: EvaluationRequest = serde_json::from_str(
            r#"{ "request_id": "r-9", "variables": { "tags": ["pii"], "score": 0.5 } }"#,
        )
        .unwrap();
        assert_eq!(request.request_id, "r-9");
        assert_eq!(request.variables["score"], Value::Float(0.5));
        assert!(request.max_steps.is_none());
    }

    #[test]
    fn repeated_evaluations_share_a_decision_digest() {
        let compiled = compile(
            r#"
            policy pii: PRIVACY { when contains(tags, "pii") then escalate to privacy_team "pii in prompt" }
            policy r: ROUTING { when len(prompt) > 20 then route to "expert_agent" else route to "fast_agent" }
            "#,
        )
        .unwrap();
        let evaluator = Evaluator::new(&RuntimeConfig::default()).unwrap();
        let request = || {
            EvaluationRequest::new("req-det")
                .with_variable("tags", vec![Value::from("pii")])
                .with_variable("prompt", "summarize the attached lab report please")
        };

        let first = evaluator.evaluate(&compiled, request()).unwrap();
        let second = evaluator.evaluate(&compiled, request()).unwrap();
        assert_eq!(
            decision_digest(first.final_action, &first.intents).unwrap(),
            decision_digest(second.final_action, &second.intents).unwrap()
        );

        let sealed = seal_trace(&first).unwrap();
        assert!(verify_chain(&sealed.events));
    }

    // ── introspection ─────────────────────────────────────────────────────────

    #[test]
    fn plan_and_visualization_agree() {
        let compiled = compile(
            "policy s: SAFETY { deny }\npolicy p: PRIVACY { allow }\npolicy c: CUSTOM { allow }",
        )
        .unwrap();
        let plan = get_execution_plan(&compiled.module);
        assert_eq!(plan, *compiled.plan);

        let text = visualize_plan(&compiled.module);
        for stage in &plan.stages {
            assert!(text.contains(stage.category.as_str()));
        }
    }
}
