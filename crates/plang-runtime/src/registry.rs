//! Copy-then-publish holder for the active compiled module.
//!
//! `publish` compiles the new policy set without holding any lock, checks
//! the activation gate, and only then swaps the active `Arc`. Evaluations
//! clone the `Arc` under a short read lock and run against that snapshot,
//! so a publish never disturbs an evaluation already in flight.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use plang_contracts::{
    error::{PlangError, PlangResult},
    execution::ExecutionTrace,
};

use crate::config::RuntimeConfig;
use crate::pipeline::{compile_with, CompiledModule, EvaluationRequest, Evaluator};

pub struct ModuleRegistry {
    config: RuntimeConfig,
    evaluator: Evaluator,
    active: RwLock<Option<Arc<CompiledModule>>>,
}

impl ModuleRegistry {
    pub fn new(config: RuntimeConfig) -> PlangResult<Self> {
        let evaluator = Evaluator::new(&config)?;
        Ok(Self {
            config,
            evaluator,
            active: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Compile `source` and make it the active module.
    ///
    /// Fails with `Parse` for bad source, and with `Activation` when
    /// `blocking_severity` is set and an unresolved conflict reaches it. On
    /// failure the previously active module stays in place.
    pub fn publish(&self, source: &str) -> PlangResult<Arc<CompiledModule>> {
        let compiled = Arc::new(compile_with(source, &self.config)?);

        if let Some(severity) = self.config.blocking_severity {
            let blocking = compiled.blocking_conflicts(severity);
            if !blocking.is_empty() {
                let summary = blocking
                    .iter()
                    .map(|c| format!("[{} {}] {}", c.conflict_type, c.severity, c.description))
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!(blocking = blocking.len(), threshold = severity, "publish refused");
                return Err(PlangError::Activation {
                    reason: format!(
                        "{} unresolved conflict(s) at or above severity {}: {}",
                        blocking.len(),
                        severity,
                        summary
                    ),
                });
            }
        }

        let mut active = self.active.write().map_err(|e| PlangError::InvalidState {
            reason: format!("module registry lock poisoned: {}", e),
        })?;
        *active = Some(Arc::clone(&compiled));
        info!(
            policies = compiled.module.len(),
            conflicts = compiled.conflicts.len(),
            "published policy module"
        );
        Ok(compiled)
    }

    /// Snapshot of the active module, if one has been published.
    pub fn active(&self) -> PlangResult<Option<Arc<CompiledModule>>> {
        let active = self.active.read().map_err(|e| PlangError::InvalidState {
            reason: format!("module registry lock poisoned: {}", e),
        })?;
        Ok(active.clone())
    }

    /// Evaluate `request` against the module active at call time.
    pub fn evaluate(&self, request: EvaluationRequest) -> PlangResult<ExecutionTrace> {
        let compiled = self.active()?.ok_or_else(|| PlangError::InvalidState {
            reason: "no policy module has been published".to_string(),
        })?;
        self.evaluator.evaluate(&compiled, request)
    }
}
