//! The deterministic engine: a tree-walking interpreter over one policy's IR.
//!
//! Execution starts at the function's entry block and follows explicit
//! control flow. Every instruction, and every builtin call evaluated inline
//! inside a condition, consumes one step of `ctx.max_steps`. The first
//! action instruction ends the function; falling off a block without a
//! terminator yields the implicit default ALLOW.
//!
//! Conditions see the request variables plus three synthetic bindings that
//! shadow any variable of the same name:
//!
//! - `ctx`: the whole execution context
//! - `request`: `{ id: request_id }`
//! - `user`: `{ id: user_id }`
//!
//! Unknown paths evaluate to `null`. Nothing here reads the clock for
//! decisions, draws randomness, or iterates a hash map, so identical inputs
//! produce identical actions and intents.

use std::cmp::Ordering;

use serde_json::json;
use tracing::{debug, warn};

use plang_contracts::{
    context::{ExecutionContext, ExecutionStatus, TraceEventKind},
    error::{PlangError, PlangResult},
    execution::ExecutionResult,
    governance::ActionType,
    intent::IntentType,
    ir::{Builtin, CompareOp, Expr, Instruction, IrAction, IrFunction},
    value::Value,
};

use crate::builtins;
use crate::intents::IntentSystem;
use crate::traits::PolicyInterpreter;

/// Nesting limit for builtin calls inside one condition.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 32;

/// Deepest expression tree the engine walks. Parsed source stays well below
/// it; hand-built IR that goes past it fails the policy instead of the
/// thread.
pub const MAX_EXPR_DEPTH: usize = 512;

/// The reference `PolicyInterpreter`.
#[derive(Debug, Clone)]
pub struct DeterministicEngine {
    max_call_depth: usize,
}

impl DeterministicEngine {
    pub fn new() -> Self {
        Self { max_call_depth: DEFAULT_MAX_CALL_DEPTH }
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}

impl Default for DeterministicEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyInterpreter for DeterministicEngine {
    /// Execute `function` against `ctx`.
    ///
    /// A context in `Pending` is treated as a standalone execution: the
    /// engine drives it to `Running` and then to `Completed` or `Failed`. A
    /// context already `Running` belongs to the DAG executor, which owns the
    /// lifecycle. Any other status is an `InvalidState` error.
    ///
    /// The step counter is reset at function entry, so `max_steps` is a
    /// per-policy budget.
    fn execute(
        &self,
        function: &IrFunction,
        ctx: &mut ExecutionContext,
        intents: &mut IntentSystem<'_>,
    ) -> PlangResult<ExecutionResult> {
        let owns_lifecycle = match ctx.status {
            ExecutionStatus::Pending => {
                ctx.start()?;
                true
            }
            ExecutionStatus::Running => false,
            status => {
                return Err(PlangError::InvalidState {
                    reason: format!(
                        "cannot execute policy '{}' in a context that is {}",
                        function.id,
                        status.as_str()
                    ),
                })
            }
        };

        let trace_start = ctx.trace.len();
        let emitted_start = intents.emitted().len();
        let stack_depth = ctx.call_stack.len();
        ctx.step_count = 0;

        debug!(
            policy = %function.id,
            category = %function.category(),
            request_id = %ctx.request_id,
            "executing policy"
        );

        let outcome = Interpreter {
            engine: self,
            function,
            ctx: &mut *ctx,
            intents: &mut *intents,
            temps: vec![None; function.temp_count as usize],
            eval_depth: 0,
        }
        .run();

        // Leave the call stack exactly as we found it, even on failure.
        ctx.call_stack.truncate(stack_depth);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                ctx.record(
                    TraceEventKind::FunctionExit,
                    Some(&function.id),
                    json!({ "status": "failed", "error": err.to_string() }),
                );
                if owns_lifecycle {
                    ctx.fail()?;
                }
                return Err(err);
            }
        };

        ctx.record(
            TraceEventKind::FunctionExit,
            Some(&function.id),
            json!({
                "status": "completed",
                "action": outcome.action.as_str(),
                "implicit": outcome.implicit,
            }),
        );
        if owns_lifecycle {
            ctx.complete()?;
        }

        Ok(ExecutionResult {
            policy: function.id.clone(),
            success: true,
            action: outcome.action,
            implicit: outcome.implicit,
            target: outcome.target,
            intents: intents.emitted()[emitted_start..].to_vec(),
            trace: ctx.trace[trace_start..].to_vec(),
            steps: ctx.step_count,
        })
    }
}

// ── Interpreter state for one function ───────────────────────────────────────

struct Outcome {
    action: ActionType,
    implicit: bool,
    target: Option<String>,
}

struct Interpreter<'a, 'v> {
    engine: &'a DeterministicEngine,
    function: &'a IrFunction,
    ctx: &'a mut ExecutionContext,
    intents: &'a mut IntentSystem<'v>,
    temps: Vec<Option<Value>>,
    eval_depth: usize,
}

impl<'a, 'v> Interpreter<'a, 'v> {
    fn run(&mut self) -> PlangResult<Outcome> {
        let function = self.function;
        self.ctx.call_stack.push(function.id.clone());
        self.ctx.record(
            TraceEventKind::FunctionEnter,
            Some(&function.id),
            json!({
                "category": function.category().as_str(),
                "priority": function.priority(),
            }),
        );

        let mut current = function.entry;
        'blocks: loop {
            let block = function.block(current).ok_or_else(|| {
                self.fault(format!("jump to missing block {}", current.0))
            })?;

            for instruction in &block.instructions {
                self.tick()?;
                match instruction {
                    Instruction::Call { function: builtin, args, dest } => {
                        let value = self.invoke(*builtin, args)?;
                        let slot = self
                            .temps
                            .get_mut(dest.0 as usize)
                            .ok_or_else(|| PlangError::Execution {
                                policy: function.id.clone(),
                                reason: format!("temporary %t{} out of range", dest.0),
                            })?;
                        *slot = Some(value);
                    }
                    Instruction::Branch { condition, then_block, else_block } => {
                        let taken = self.eval(condition)?.is_truthy();
                        current = if taken { *then_block } else { *else_block };
                        continue 'blocks;
                    }
                    Instruction::Jump { target } => {
                        current = *target;
                        continue 'blocks;
                    }
                    Instruction::Action(action) => {
                        self.emit_action(action);
                        return Ok(Outcome {
                            action: action.action,
                            implicit: false,
                            target: action.target.clone(),
                        });
                    }
                }
            }

            // No terminator: fall through to the default.
            debug!(policy = %function.id, block = current.0, "no action fired, default allow");
            return Ok(Outcome { action: ActionType::Allow, implicit: true, target: None });
        }
    }

    /// Consume one step, failing once the budget would be exceeded.
    fn tick(&mut self) -> PlangResult<()> {
        if self.ctx.step_count >= self.ctx.max_steps {
            warn!(
                policy = %self.function.id,
                max_steps = self.ctx.max_steps,
                "step limit exceeded"
            );
            return Err(PlangError::StepLimitExceeded {
                policy: self.function.id.clone(),
                max_steps: self.ctx.max_steps,
            });
        }
        self.ctx.step_count += 1;
        Ok(())
    }

    fn fault(&self, reason: String) -> PlangError {
        PlangError::Execution {
            policy: self.function.id.clone(),
            reason,
        }
    }

    // ── Actions & intents ────────────────────────────────────────────────────

    fn emit_action(&mut self, action: &IrAction) {
        let function = self.function;
        self.ctx.record(
            TraceEventKind::Action,
            Some(&function.id),
            json!({
                "action": action.action.as_str(),
                "target": action.target,
                "reason": action.reason,
            }),
        );

        let payload = match action.action {
            ActionType::Deny => json!({
                "reason": action
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("denied by policy '{}'", function.id)),
            }),
            ActionType::Route => json!({ "target_agent": action.target }),
            ActionType::Escalate => {
                let mut payload = serde_json::Map::new();
                if let Some(target) = &action.target {
                    payload.insert("target".to_string(), json!(target));
                }
                if let Some(reason) = &action.reason {
                    payload.insert("reason".to_string(), json!(reason));
                }
                serde_json::Value::Object(payload)
            }
            ActionType::Allow => json!({}),
        };

        let id = self.intents.create(
            IntentType::for_action(action.action),
            payload,
            Some(function.priority()),
            Some(&function.id),
        );

        if self.intents.emit(&id) {
            self.ctx.record(
                TraceEventKind::IntentEmitted,
                Some(&function.id),
                json!({ "intent_id": id.to_string(), "intent_type": IntentType::for_action(action.action).to_string() }),
            );
        } else {
            let errors = self
                .intents
                .pending(&id)
                .map(|i| i.validation_errors.clone())
                .unwrap_or_default();
            self.ctx.record(
                TraceEventKind::IntentRejected,
                Some(&function.id),
                json!({ "intent_id": id.to_string(), "errors": errors }),
            );
        }
    }

    // ── Expression evaluation ────────────────────────────────────────────────

    fn eval(&mut self, expr: &Expr) -> PlangResult<Value> {
        if self.eval_depth >= MAX_EXPR_DEPTH {
            return Err(self.fault(format!(
                "expression nested deeper than {} levels",
                MAX_EXPR_DEPTH
            )));
        }
        self.eval_depth += 1;
        let value = self.eval_node(expr);
        self.eval_depth -= 1;
        value
    }

    fn eval_node(&mut self, expr: &Expr) -> PlangResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path(segments) => Ok(self.resolve_path(segments)),
            Expr::Temp(temp) => self
                .temps
                .get(temp.0 as usize)
                .cloned()
                .flatten()
                .ok_or_else(|| self.fault(format!("temporary %t{} read before assignment", temp.0))),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::List(values))
            }
            Expr::Call { function, args } => {
                self.tick()?;
                self.invoke(*function, args)
            }
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.is_truthy())),
            Expr::And(lhs, rhs) => {
                if !self.eval(lhs)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
            }
            Expr::Or(lhs, rhs) => {
                if self.eval(lhs)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
            }
            Expr::Compare { op, lhs, rhs } => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                self.compare(*op, &left, &right).map(Value::Bool)
            }
        }
    }

    fn resolve_path(&self, segments: &[String]) -> Value {
        let Some((head, rest)) = segments.split_first() else {
            return Value::Null;
        };

        let root = match head.as_str() {
            "ctx" => self.ctx.to_value(),
            "request" => Value::map([("id", Value::from(self.ctx.request_id.as_str()))]),
            "user" => Value::map([("id", Value::from(self.ctx.user_id.clone()))]),
            name => match self.ctx.variables.get(name) {
                Some(value) => value.clone(),
                None => return Value::Null,
            },
        };

        let mut current = &root;
        for segment in rest {
            match current.get(segment) {
                Some(next) => current = next,
                None => return Value::Null,
            }
        }
        current.clone()
    }

    fn compare(&self, op: CompareOp, left: &Value, right: &Value) -> PlangResult<bool> {
        let ordered = |wanted: fn(Ordering) -> bool| -> PlangResult<bool> {
            let ordering = match (left, right) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => match (left.as_f64(), right.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                },
            };
            ordering.map(wanted).ok_or_else(|| {
                self.fault(format!(
                    "cannot compare {} {} {}",
                    left.type_name(),
                    op.symbol(),
                    right.type_name()
                ))
            })
        };

        match op {
            CompareOp::Eq => Ok(left.loose_eq(right)),
            CompareOp::Ne => Ok(!left.loose_eq(right)),
            CompareOp::Lt => ordered(Ordering::is_lt),
            CompareOp::Le => ordered(Ordering::is_le),
            CompareOp::Gt => ordered(Ordering::is_gt),
            CompareOp::Ge => ordered(Ordering::is_ge),
        }
    }

    /// Evaluate arguments and call a builtin, tracing entry and exit.
    fn invoke(&mut self, function: Builtin, args: &[Expr]) -> PlangResult<Value> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }

        let policy = self.function.id.as_str();
        if self.ctx.call_stack.len() > self.engine.max_call_depth {
            return Err(self.fault(format!(
                "call depth limit of {} exceeded",
                self.engine.max_call_depth
            )));
        }

        self.ctx.call_stack.push(function.name().to_string());
        self.ctx.record(
            TraceEventKind::CallEnter,
            Some(policy),
            json!({
                "function": function.name(),
                "args": values.iter().map(serde_json::Value::from).collect::<Vec<_>>(),
            }),
        );

        let result = builtins::call(function, &values);
        self.ctx.call_stack.pop();

        match result {
            Ok(value) => {
                self.ctx.record(
                    TraceEventKind::CallExit,
                    Some(policy),
                    json!({ "function": function.name(), "result": serde_json::Value::from(&value) }),
                );
                Ok(value)
            }
            Err(reason) => {
                self.ctx.record(
                    TraceEventKind::CallExit,
                    Some(policy),
                    json!({ "function": function.name(), "error": reason }),
                );
                Err(self.fault(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use plang_contracts::{
        governance::GovernanceCategory,
        intent::Intent,
        ir::{BasicBlock, BlockId, GovernanceMetadata, IrModule},
    };

    use crate::traits::IntentValidator;

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Accepts every intent.
    struct AcceptAll;

    impl IntentValidator for AcceptAll {
        fn validate(&self, _intent: &Intent) -> Vec<String> {
            vec![]
        }
    }

    /// Rejects every DENY intent; used to check rejected intents are traced.
    struct RejectDeny;

    impl IntentValidator for RejectDeny {
        fn validate(&self, intent: &Intent) -> Vec<String> {
            match intent.intent_type {
                IntentType::Deny => vec!["deny rejected for test".to_string()],
                _ => vec![],
            }
        }
    }

    fn compile(source: &str) -> IrModule {
        plang_lang::build(&plang_lang::parse(source).unwrap())
    }

    fn run(source: &str, ctx: &mut ExecutionContext) -> PlangResult<ExecutionResult> {
        let module = compile(source);
        let function = &module.functions[0];
        let validator = AcceptAll;
        let mut intents = IntentSystem::new(&validator);
        DeterministicEngine::new().execute(function, ctx, &mut intents)
    }

    fn action_of(source: &str, ctx: ExecutionContext) -> ActionType {
        let mut ctx = ctx;
        run(source, &mut ctx).unwrap().action
    }

    /// A function whose entry block jumps to itself forever.
    fn looping_function() -> IrFunction {
        IrFunction {
            id: "looper".to_string(),
            governance: GovernanceMetadata {
                category: GovernanceCategory::Custom,
                priority: 0,
                explicit_priority: false,
            },
            entry: BlockId(0),
            blocks: vec![BasicBlock {
                id: BlockId(0),
                label: "entry".to_string(),
                instructions: vec![Instruction::Jump { target: BlockId(0) }],
            }],
            temp_count: 0,
            line: 1,
        }
    }

    // ── Actions ───────────────────────────────────────────────────────────────

    #[test]
    fn unconditional_deny() {
        let mut ctx = ExecutionContext::new("req-1");
        let result = run("policy p: SAFETY { deny \"blocked\" }", &mut ctx).unwrap();

        assert!(result.success);
        assert_eq!(result.action, ActionType::Deny);
        assert!(!result.implicit);
        assert_eq!(result.intents.len(), 1);
        assert_eq!(result.intents[0].intent_type, IntentType::Deny);
        assert_eq!(result.intents[0].payload_str("reason"), Some("blocked"));
        assert_eq!(ctx.status, ExecutionStatus::Completed);
    }

    #[test]
    fn deny_without_reason_gets_default_reason() {
        let mut ctx = ExecutionContext::new("req-1");
        let result = run("policy gate: SAFETY { deny }", &mut ctx).unwrap();
        assert_eq!(result.intents[0].payload_str("reason"), Some("denied by policy 'gate'"));
    }

    #[test]
    fn empty_policy_defaults_to_allow() {
        let mut ctx = ExecutionContext::new("req-1");
        let result = run("policy p: CUSTOM { }", &mut ctx).unwrap();
        assert_eq!(result.action, ActionType::Allow);
        assert!(result.implicit);
        assert!(result.intents.is_empty());
    }

    #[test]
    fn conditional_route_traces_action_and_emits_intent() {
        let mut ctx = ExecutionContext::new("req-1");
        let result =
            run(r#"policy r: ROUTING { when true then route to "expert_agent" }"#, &mut ctx).unwrap();

        assert_eq!(result.action, ActionType::Route);
        assert_eq!(result.target.as_deref(), Some("expert_agent"));

        let action_event = result
            .trace
            .iter()
            .find(|e| e.kind == TraceEventKind::Action)
            .expect("action event must be traced");
        assert_eq!(action_event.data["action"], "route");
        assert_eq!(action_event.data["target"], "expert_agent");

        assert_eq!(result.intents[0].intent_type, IntentType::Route);
        assert_eq!(result.intents[0].payload_str("target_agent"), Some("expert_agent"));
    }

    #[test]
    fn escalation_payload_carries_target_and_reason() {
        let mut ctx = ExecutionContext::new("req-1");
        let result =
            run(r#"policy e: OPERATIONAL { escalate to oncall "needs review" }"#, &mut ctx).unwrap();
        let intent = &result.intents[0];
        assert_eq!(intent.payload_str("target"), Some("oncall"));
        assert_eq!(intent.payload_str("reason"), Some("needs review"));
        assert!(intent.requires_confirmation);
    }

    #[test]
    fn rejected_intent_is_traced_not_returned() {
        let module = compile("policy p: SAFETY { deny }");
        let validator = RejectDeny;
        let mut intents = IntentSystem::new(&validator);
        let mut ctx = ExecutionContext::new("req-1");
        let result = DeterministicEngine::new()
            .execute(&module.functions[0], &mut ctx, &mut intents)
            .unwrap();

        assert_eq!(result.action, ActionType::Deny);
        assert!(result.intents.is_empty());
        assert!(ctx.trace.iter().any(|e| e.kind == TraceEventKind::IntentRejected));
        assert_eq!(intents.pending_intents().len(), 1);
    }

    // ── Conditions ────────────────────────────────────────────────────────────

    #[test]
    fn conditions_read_variables_and_synthetic_bindings() {
        let source = r#"
            policy p: PRIVACY {
                when user.id == "u-1" and request.id == "req-9" and tier == "gold" then deny
            }
        "#;
        let ctx = ExecutionContext::new("req-9")
            .with_user("u-1")
            .with_variable("tier", "gold");
        assert_eq!(action_of(source, ctx), ActionType::Deny);

        let ctx = ExecutionContext::new("req-9").with_user("u-2").with_variable("tier", "gold");
        assert_eq!(action_of(source, ctx), ActionType::Allow);
    }

    #[test]
    fn synthetic_bindings_shadow_variables() {
        let source = r#"policy p: CUSTOM { when user.id == "spoofed" then deny }"#;
        let spoof = Value::map([("id", Value::from("spoofed"))]);
        let ctx = ExecutionContext::new("r").with_user("real").with_variable("user", spoof);
        assert_eq!(action_of(source, ctx), ActionType::Allow);
    }

    #[test]
    fn ctx_binding_exposes_context_fields() {
        let source = r#"policy p: CUSTOM { when ctx.variables.flag and ctx.request_id == "r" then deny }"#;
        let ctx = ExecutionContext::new("r").with_variable("flag", true);
        assert_eq!(action_of(source, ctx), ActionType::Deny);
    }

    #[test]
    fn ctx_binding_hides_the_execution_id() {
        let source = "policy p: CUSTOM { when ctx.execution_id == null then route to \"a\" else deny }";
        let first = ExecutionContext::new("r");
        let second = ExecutionContext::new("r");
        assert_ne!(first.execution_id, second.execution_id);
        assert_eq!(first.to_value(), second.to_value());
        assert_eq!(action_of(source, first), ActionType::Route);
    }

    #[test]
    fn unknown_paths_are_null() {
        let source = "policy p: CUSTOM { when missing.field == null then deny }";
        assert_eq!(action_of(source, ExecutionContext::new("r")), ActionType::Deny);
    }

    #[test]
    fn else_branch_and_nested_when() {
        let source = r#"
            policy p: OPERATIONAL {
                when score >= 10 then {
                    when score > 50 then deny
                    escalate "medium"
                } else allow
            }
        "#;
        let with_score = |s: i64| ExecutionContext::new("r").with_variable("score", s);
        assert_eq!(action_of(source, with_score(70)), ActionType::Deny);
        assert_eq!(action_of(source, with_score(20)), ActionType::Escalate);
        assert_eq!(action_of(source, with_score(3)), ActionType::Allow);
    }

    #[test]
    fn builtins_in_conditions_are_traced() {
        let mut ctx = ExecutionContext::new("r")
            .with_variable("tags", Value::List(vec![Value::from("pii"), Value::from("public")]));
        let result = run(r#"policy p: PRIVACY { when contains(tags, "pii") then deny }"#, &mut ctx).unwrap();

        assert_eq!(result.action, ActionType::Deny);
        let kinds: Vec<TraceEventKind> = result.trace.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TraceEventKind::FunctionEnter,
                TraceEventKind::CallEnter,
                TraceEventKind::CallExit,
                TraceEventKind::Action,
                TraceEventKind::IntentEmitted,
                TraceEventKind::FunctionExit,
            ]
        );
        assert!(ctx.call_stack.is_empty());
    }

    #[test]
    fn short_circuit_skips_inline_call() {
        // `len(flag)` would fail on a bool; `and` must never evaluate it.
        let source = "policy p: CUSTOM { when false and len(flag) > 0 then deny }";
        let mut ctx = ExecutionContext::new("r").with_variable("flag", true);
        let result = run(source, &mut ctx).unwrap();
        assert_eq!(result.action, ActionType::Allow);
        assert!(!ctx.trace.iter().any(|e| e.kind == TraceEventKind::CallEnter));
    }

    #[test]
    fn comparisons_coerce_numbers_and_order_strings() {
        let source = r#"policy p: CUSTOM { when ratio < 1 and name > "alpha" then deny }"#;
        let ctx = ExecutionContext::new("r")
            .with_variable("ratio", 0.5)
            .with_variable("name", "beta");
        assert_eq!(action_of(source, ctx), ActionType::Deny);
    }

    // ── Failures ──────────────────────────────────────────────────────────────

    #[test]
    fn type_error_fails_policy_with_execution_error() {
        let mut ctx = ExecutionContext::new("r").with_variable("flag", true);
        let err = run("policy p: CUSTOM { when len(flag) > 0 then deny }", &mut ctx).unwrap_err();

        match err {
            PlangError::Execution { policy, reason } => {
                assert_eq!(policy, "p");
                assert!(reason.contains("unsupported type bool"));
            }
            other => panic!("expected Execution error, got {:?}", other),
        }
        assert_eq!(ctx.status, ExecutionStatus::Failed);
        assert!(ctx.call_stack.is_empty());
    }

    #[test]
    fn ordering_mismatched_types_is_an_error() {
        let mut ctx = ExecutionContext::new("r").with_variable("n", "ten");
        let err = run("policy p: CUSTOM { when n > 3 then deny }", &mut ctx).unwrap_err();
        assert!(err.to_string().contains("cannot compare string > int"));
    }

    #[test]
    fn step_limit_stops_runaway_loop() {
        let function = looping_function();
        let validator = AcceptAll;
        let mut intents = IntentSystem::new(&validator);
        let mut ctx = ExecutionContext::new("r").with_max_steps(10);

        let err = DeterministicEngine::new()
            .execute(&function, &mut ctx, &mut intents)
            .unwrap_err();

        assert_eq!(
            err,
            PlangError::StepLimitExceeded { policy: "looper".to_string(), max_steps: 10 }
        );
        assert_eq!(ctx.step_count, 10);
        assert_eq!(ctx.status, ExecutionStatus::Failed);
    }

    #[test]
    fn over_deep_condition_fails_the_policy() {
        let mut condition = Expr::Literal(Value::Bool(true));
        for _ in 0..MAX_EXPR_DEPTH + 8 {
            condition = Expr::Not(Box::new(condition));
        }
        let mut function = looping_function();
        function.id = "deep".to_string();
        function.blocks = vec![
            BasicBlock {
                id: BlockId(0),
                label: "entry".to_string(),
                instructions: vec![Instruction::Branch {
                    condition,
                    then_block: BlockId(1),
                    else_block: BlockId(1),
                }],
            },
            BasicBlock { id: BlockId(1), label: "join".to_string(), instructions: vec![] },
        ];

        let validator = AcceptAll;
        let mut intents = IntentSystem::new(&validator);
        let mut ctx = ExecutionContext::new("r");
        let err = DeterministicEngine::new()
            .execute(&function, &mut ctx, &mut intents)
            .unwrap_err();

        match err {
            PlangError::Execution { policy, reason } => {
                assert_eq!(policy, "deep");
                assert!(reason.contains("nested deeper than"));
            }
            other => panic!("expected Execution, got {:?}", other),
        }
    }

    #[test]
    fn step_limit_counts_every_instruction() {
        let mut body = String::new();
        for i in 0..12 {
            body.push_str(&format!("when v == {} then deny\n", i + 100));
        }
        let source = format!("policy many: CUSTOM {{ {} }}", body);

        let mut ctx = ExecutionContext::new("r").with_variable("v", 0i64).with_max_steps(10);
        assert!(matches!(
            run(&source, &mut ctx),
            Err(PlangError::StepLimitExceeded { max_steps: 10, .. })
        ));

        let mut ctx = ExecutionContext::new("r").with_variable("v", 0i64).with_max_steps(100);
        assert_eq!(run(&source, &mut ctx).unwrap().steps, 12);
    }

    #[test]
    fn finished_context_cannot_be_reused() {
        let mut ctx = ExecutionContext::new("r");
        run("policy p: CUSTOM { allow }", &mut ctx).unwrap();
        assert!(matches!(
            run("policy p: CUSTOM { allow }", &mut ctx),
            Err(PlangError::InvalidState { .. })
        ));
    }

    // ── Determinism ───────────────────────────────────────────────────────────

    #[test]
    fn identical_inputs_produce_identical_outputs() {
        let source = r#"
            policy r: ROUTING {
                when contains(regions, "eu") and len(name) > 2 then route to "eu_agent"
                else escalate "no region"
            }
        "#;
        let mut variables = BTreeMap::new();
        variables.insert("regions".to_string(), Value::List(vec![Value::from("eu")]));
        variables.insert("name".to_string(), Value::from("alice"));

        let mut first = ExecutionContext::new("r").with_variables(variables.clone());
        let mut second = ExecutionContext::new("r").with_variables(variables);
        let a = run(source, &mut first).unwrap();
        let b = run(source, &mut second).unwrap();

        assert_eq!(a.action, b.action);
        assert_eq!(a.intents, b.intents);
        assert_eq!(
            serde_json::to_vec(&a.intents).unwrap(),
            serde_json::to_vec(&b.intents).unwrap()
        );
    }
}
