//! # plang-runtime
//!
//! The caller-facing surface of the PLang policy core.
//!
//! ## Overview
//!
//! - [`pipeline`]: `compile`, `evaluate`, `get_execution_plan` and
//!   `visualize_plan`, plus the reusable [`Evaluator`]
//! - [`registry`]: a copy-then-publish holder for the active module, with an
//!   optional activation gate on unresolved conflicts
//! - [`config`]: TOML runtime configuration
//! - [`scenarios`]: three reference policy sets run end to end
//!
//! ## Usage
//!
//! ```rust,ignore
//! use plang_runtime::{compile, EvaluationRequest, Evaluator, RuntimeConfig};
//!
//! let compiled = compile(r#"policy r: ROUTING { route to "general_agent" }"#)?;
//! let evaluator = Evaluator::new(&RuntimeConfig::default())?;
//! let trace = evaluator.evaluate(&compiled, EvaluationRequest::new("req-1"))?;
//! ```

pub mod config;
pub mod pipeline;
pub mod registry;
pub mod scenarios;

pub use config::RuntimeConfig;
pub use pipeline::{
    compile, compile_with, evaluate, get_execution_plan, visualize_plan, CompiledModule,
    EvaluationRequest, Evaluator,
};
pub use registry::ModuleRegistry;
