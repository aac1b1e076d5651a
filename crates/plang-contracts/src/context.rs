//! Execution context and trace events.
//!
//! One `ExecutionContext` is created per evaluation request. It is mutated
//! only by the engine and the DAG executor while that evaluation runs, and
//! its `trace` is the audit artifact handed back to the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PlangError, PlangResult};
use crate::value::Value;

/// Step budget applied when the caller does not supply one.
pub const DEFAULT_MAX_STEPS: u64 = 256;

/// Unique identifier for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub uuid::Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of an execution: `Pending -> Running -> (Completed | Failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed => "FAILED",
        }
    }
}

/// What a trace event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventKind {
    StageEnter,
    StageExit,
    FunctionEnter,
    FunctionExit,
    CallEnter,
    CallExit,
    Action,
    IntentEmitted,
    IntentRejected,
    PolicyFailed,
    EarlyTermination,
}

/// One structured entry in the execution trace.
///
/// `timestamp` is the only field excluded from the determinism guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    /// Value of the step counter when the event was recorded.
    pub step: u64,
    /// Policy the event belongs to, absent for stage-level events.
    pub policy: Option<String>,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Mutable state of one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub variables: BTreeMap<String, Value>,
    pub call_stack: Vec<String>,
    pub trace: Vec<TraceEvent>,
    pub step_count: u64,
    pub max_steps: u64,
}

impl ExecutionContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: None,
            agent_id: None,
            execution_id: ExecutionId::new(),
            status: ExecutionStatus::Pending,
            variables: BTreeMap::new(),
            call_stack: Vec::new(),
            trace: Vec::new(),
            step_count: 0,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    /// `Pending -> Running`.
    pub fn start(&mut self) -> PlangResult<()> {
        self.transition(ExecutionStatus::Pending, ExecutionStatus::Running)
    }

    /// `Running -> Completed`.
    pub fn complete(&mut self) -> PlangResult<()> {
        self.transition(ExecutionStatus::Running, ExecutionStatus::Completed)
    }

    /// `Running -> Failed`.
    pub fn fail(&mut self) -> PlangResult<()> {
        self.transition(ExecutionStatus::Running, ExecutionStatus::Failed)
    }

    fn transition(&mut self, from: ExecutionStatus, to: ExecutionStatus) -> PlangResult<()> {
        if self.status != from {
            return Err(PlangError::InvalidState {
                reason: format!(
                    "cannot move execution {} from {} to {}",
                    self.execution_id.0,
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }
        self.status = to;
        Ok(())
    }

    /// Append an event stamped with the current step counter.
    pub fn record(
        &mut self,
        kind: TraceEventKind,
        policy: Option<&str>,
        data: serde_json::Value,
    ) {
        self.trace.push(TraceEvent {
            kind,
            step: self.step_count,
            policy: policy.map(str::to_string),
            data,
            timestamp: Utc::now(),
        });
    }

    /// The context as a value, exposed to conditions as `ctx`.
    ///
    /// `execution_id` and event timestamps are left out: a condition sees
    /// only what the request and the evaluation itself determine.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("request_id", Value::from(self.request_id.as_str())),
            ("user_id", Value::from(self.user_id.clone())),
            ("agent_id", Value::from(self.agent_id.clone())),
            ("status", Value::from(self.status.as_str())),
            ("step_count", Value::Int(self.step_count as i64)),
            ("max_steps", Value::Int(self.max_steps as i64)),
            ("variables", Value::Map(self.variables.clone())),
        ])
    }
}
