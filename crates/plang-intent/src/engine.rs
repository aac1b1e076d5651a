//! Schema-based intent validator.
//!
//! `SchemaIntentValidator` implements the `IntentValidator` trait from
//! `plang-core`. Every intent type maps to a fixed list of rules, and every
//! rule is a JSON Schema document checked against the intent payload:
//!
//! | Type     | Rule                                              |
//! |----------|---------------------------------------------------|
//! | ROUTE    | `target_agent` is a string with a non-blank char  |
//! | DENY     | `reason` is a string with a non-blank char        |
//! | ESCALATE | a non-blank `target` or a non-blank `reason`      |
//! | ALLOW    | payload is an object                              |
//! | custom   | the registered schema, else payload is an object  |
//!
//! All rules of a type are evaluated and all failures are returned together.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::{debug, warn};

use plang_contracts::{
    error::{PlangError, PlangResult},
    intent::{Intent, IntentType},
};
use plang_core::traits::IntentValidator;

/// One compiled validation rule.
struct IntentRule {
    /// Message reported when the payload fails the schema.
    message: String,
    validator: jsonschema::Validator,
}

impl IntentRule {
    fn compile(message: impl Into<String>, schema: &serde_json::Value) -> PlangResult<Self> {
        let message = message.into();
        let validator = jsonschema::validator_for(schema).map_err(|e| PlangError::Config {
            reason: format!("invalid intent schema for rule '{}': {}", message, e),
        })?;
        Ok(Self { message, validator })
    }

    /// Failure text for `payload`, or `None` when it satisfies the schema.
    fn check(&self, payload: &serde_json::Value) -> Option<String> {
        let details: Vec<String> = self
            .validator
            .iter_errors(payload)
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("at {}: {}", path, error)
                }
            })
            .collect();
        if details.is_empty() {
            None
        } else {
            Some(format!("{} ({})", self.message, details.join("; ")))
        }
    }
}

fn non_blank_string() -> serde_json::Value {
    json!({ "type": "string", "pattern": "\\S" })
}

fn object_schema() -> serde_json::Value {
    json!({ "type": "object" })
}

/// The PLang intent validator.
pub struct SchemaIntentValidator {
    route: Vec<IntentRule>,
    deny: Vec<IntentRule>,
    escalate: Vec<IntentRule>,
    allow: Vec<IntentRule>,
    /// Rules for unregistered custom types.
    custom_default: Vec<IntentRule>,
    /// Schemas registered for specific custom types.
    custom: BTreeMap<String, Vec<IntentRule>>,
}

impl SchemaIntentValidator {
    /// Compile the built-in rules.
    ///
    /// Only fails if a built-in schema does not compile, which would be a
    /// defect in this crate; the error is still propagated, never panicked.
    pub fn new() -> PlangResult<Self> {
        let route = vec![IntentRule::compile(
            "ROUTE requires a non-empty target_agent",
            &json!({
                "type": "object",
                "required": ["target_agent"],
                "properties": { "target_agent": non_blank_string() }
            }),
        )?];

        let deny = vec![IntentRule::compile(
            "DENY requires a non-empty reason",
            &json!({
                "type": "object",
                "required": ["reason"],
                "properties": { "reason": non_blank_string() }
            }),
        )?];

        let escalate = vec![
            IntentRule::compile("ESCALATE payload must be an object", &object_schema())?,
            IntentRule::compile(
                "ESCALATE requires a non-empty target or reason",
                &json!({
                    "anyOf": [
                        { "required": ["target"], "properties": { "target": non_blank_string() } },
                        { "required": ["reason"], "properties": { "reason": non_blank_string() } }
                    ]
                }),
            )?,
        ];

        let allow = vec![IntentRule::compile("ALLOW payload must be an object", &object_schema())?];
        let custom_default = vec![IntentRule::compile(
            "custom intent payload must be an object",
            &object_schema(),
        )?];

        Ok(Self {
            route,
            deny,
            escalate,
            allow,
            custom_default,
            custom: BTreeMap::new(),
        })
    }

    /// Register a JSON Schema for `CUSTOM:<name>` intents.
    ///
    /// Registering the same name twice replaces the earlier schema. A schema
    /// that does not compile is a `Config` error.
    pub fn register_custom(
        &mut self,
        name: impl Into<String>,
        schema: &serde_json::Value,
    ) -> PlangResult<()> {
        let name = name.into();
        let rule = IntentRule::compile(format!("CUSTOM:{} payload violates its schema", name), schema)?;
        debug!(intent_type = %name, "registered custom intent schema");
        self.custom.insert(name, vec![rule]);
        Ok(())
    }

    fn rules_for(&self, intent_type: &IntentType) -> &[IntentRule] {
        match intent_type {
            IntentType::Route => &self.route,
            IntentType::Deny => &self.deny,
            IntentType::Escalate => &self.escalate,
            IntentType::Allow => &self.allow,
            IntentType::Custom(name) => self
                .custom
                .get(name)
                .map(Vec::as_slice)
                .unwrap_or(&self.custom_default),
        }
    }
}

impl IntentValidator for SchemaIntentValidator {
    fn validate(&self, intent: &Intent) -> Vec<String> {
        let errors: Vec<String> = self
            .rules_for(&intent.intent_type)
            .iter()
            .filter_map(|rule| rule.check(&intent.payload))
            .collect();

        if errors.is_empty() {
            debug!(intent_id = %intent.id, intent_type = %intent.intent_type, "intent valid");
        } else {
            warn!(
                intent_id = %intent.id,
                intent_type = %intent.intent_type,
                errors = errors.len(),
                "intent failed validation"
            );
        }
        errors
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use plang_contracts::intent::{Intent, IntentId, IntentType};
    use plang_core::traits::IntentValidator;

    use super::SchemaIntentValidator;

    fn make_intent(intent_type: IntentType, payload: serde_json::Value) -> Intent {
        Intent {
            id: IntentId::derive(Some("test-policy"), 0, &intent_type),
            intent_type,
            payload,
            priority: 0,
            source_policy: Some("test-policy".to_string()),
            requires_confirmation: false,
            validation_errors: vec![],
        }
    }

    fn errors(intent_type: IntentType, payload: serde_json::Value) -> Vec<String> {
        SchemaIntentValidator::new()
            .unwrap()
            .validate(&make_intent(intent_type, payload))
    }

    // ── ROUTE ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_route_with_target_passes() {
        assert!(errors(IntentType::Route, json!({ "target_agent": "expert_agent" })).is_empty());
    }

    #[test]
    fn test_route_without_target_fails() {
        let errs = errors(IntentType::Route, json!({}));
        assert_eq!(errs.len(), 1);
        assert!(errs[0].starts_with("ROUTE requires a non-empty target_agent"));
    }

    #[test]
    fn test_route_with_blank_or_null_target_fails() {
        assert!(!errors(IntentType::Route, json!({ "target_agent": "" })).is_empty());
        assert!(!errors(IntentType::Route, json!({ "target_agent": "   " })).is_empty());
        assert!(!errors(IntentType::Route, json!({ "target_agent": null })).is_empty());
    }

    // ── DENY ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_deny_requires_reason() {
        assert!(errors(IntentType::Deny, json!({ "reason": "blocked" })).is_empty());
        let errs = errors(IntentType::Deny, json!({ "reason": "" }));
        assert!(errs[0].contains("DENY requires a non-empty reason"));
    }

    // ── ESCALATE ──────────────────────────────────────────────────────────────

    #[test]
    fn test_escalate_accepts_target_or_reason() {
        assert!(errors(IntentType::Escalate, json!({ "target": "oncall" })).is_empty());
        assert!(errors(IntentType::Escalate, json!({ "reason": "cost spike" })).is_empty());
        assert!(errors(
            IntentType::Escalate,
            json!({ "target": "oncall", "reason": "cost spike" })
        )
        .is_empty());
    }

    #[test]
    fn test_escalate_with_neither_fails() {
        let errs = errors(IntentType::Escalate, json!({}));
        assert_eq!(errs.len(), 1);
        assert!(errs[0].starts_with("ESCALATE requires a non-empty target or reason"));
    }

    #[test]
    fn test_escalate_non_object_reports_both_rules() {
        let errs = errors(IntentType::Escalate, json!("nope"));
        assert_eq!(errs.len(), 2);
    }

    // ── ALLOW & custom ────────────────────────────────────────────────────────

    #[test]
    fn test_allow_is_always_valid_for_objects() {
        assert!(errors(IntentType::Allow, json!({})).is_empty());
        assert!(errors(IntentType::Allow, json!({ "note": 1 })).is_empty());
    }

    #[test]
    fn test_unregistered_custom_type_is_valid() {
        assert!(errors(IntentType::Custom("notify".into()), json!({})).is_empty());
    }

    #[test]
    fn test_registered_custom_schema_is_enforced() {
        let mut validator = SchemaIntentValidator::new().unwrap();
        validator
            .register_custom(
                "notify",
                &json!({
                    "type": "object",
                    "required": ["channel"],
                    "properties": { "channel": { "type": "string" } }
                }),
            )
            .unwrap();

        let ok = make_intent(IntentType::Custom("notify".into()), json!({ "channel": "ops" }));
        let bad = make_intent(IntentType::Custom("notify".into()), json!({}));
        assert!(validator.validate(&ok).is_empty());
        assert!(validator.validate(&bad)[0].starts_with("CUSTOM:notify payload violates its schema"));
    }

    #[test]
    fn test_invalid_custom_schema_is_config_error() {
        let mut validator = SchemaIntentValidator::new().unwrap();
        let result = validator.register_custom("broken", &json!({ "type": 12 }));
        assert!(matches!(result, Err(plang_contracts::error::PlangError::Config { .. })));
    }
}
