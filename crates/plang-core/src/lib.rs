//! # plang-core
//!
//! Analysis and execution of compiled PLang modules.
//!
//! This crate provides:
//! - The two seams (`PolicyInterpreter`, `IntentValidator`)
//! - The `DeterministicEngine` that interprets one policy's IR
//! - The `IntentSystem` that tracks pending and emitted intents
//! - The `ConflictResolver` and the route graph behind its cycle pass
//! - The `DagExecutor` that walks a category-ordered `ExecutionPlan`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use plang_core::{build_plan, ConflictResolver, DagExecutor, DeterministicEngine};
//! ```

pub mod builtins;
pub mod engine;
pub mod executor;
pub mod graph;
pub mod intents;
pub mod resolver;
pub mod traits;

pub use engine::DeterministicEngine;
pub use executor::{build_plan, visualize_plan, DagExecutor};
pub use intents::IntentSystem;
pub use resolver::{apply_cycle_breaks, ConflictResolver, Resolution};
