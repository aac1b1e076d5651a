//! # plang-intent
//!
//! Intent validation for the PLang policy core.
//!
//! This crate provides [`engine::SchemaIntentValidator`], which implements
//! the [`plang_core::traits::IntentValidator`] trait. Each intent type has a
//! fixed rule set written as JSON Schema and checked with the `jsonschema`
//! crate. Custom intent types may register their own schema.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use plang_intent::engine::SchemaIntentValidator;
//!
//! let mut validator = SchemaIntentValidator::new()?;
//! validator.register_custom("notify", &serde_json::json!({
//!     "type": "object",
//!     "required": ["channel"]
//! }))?;
//! ```

pub mod engine;

pub use engine::SchemaIntentValidator;
