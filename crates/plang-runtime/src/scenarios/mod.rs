//! Reference scenarios.
//!
//! Each scenario compiles one of the policy sets under `policies/`, evaluates
//! a few requests against it through the public runtime API, and prints what
//! happened. They double as end-to-end tests of the whole pipeline.

pub mod conflict_audit;
pub mod expert_routing;
pub mod safety_gate;
