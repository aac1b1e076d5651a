//! Intent records.
//!
//! An intent describes a downstream effect the evaluation wants (route the
//! request, deny it, escalate it). Intents are side-effect free; the caller's
//! enforcement layer decides what to do with them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::governance::ActionType;

/// Deterministic intent identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntentId(pub uuid::Uuid);

impl IntentId {
    /// Namespace for intent ids; ids are UUIDv5 names inside it.
    pub const NAMESPACE: uuid::Uuid = uuid::Uuid::from_u128(0x5f1c_2a7e_9b3d_4c60_8e21_7a4f_0d93_b6c8);

    /// Derive an id from the emitting policy, the intent's ordinal within the
    /// evaluation, and its type.
    pub fn derive(source_policy: Option<&str>, ordinal: u64, intent_type: &IntentType) -> Self {
        let name = format!(
            "{}/{}/{}",
            source_policy.unwrap_or("-"),
            ordinal,
            intent_type
        );
        Self(uuid::Uuid::new_v5(&Self::NAMESPACE, name.as_bytes()))
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of effect an intent requests.
///
/// `Custom` is the open extension point; its validation rule is explicit
/// like every other variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentType {
    Route,
    Deny,
    Allow,
    Escalate,
    Custom(String),
}

impl IntentType {
    /// Intent type produced by an action emission.
    pub fn for_action(action: ActionType) -> Self {
        match action {
            ActionType::Allow => IntentType::Allow,
            ActionType::Route => IntentType::Route,
            ActionType::Escalate => IntentType::Escalate,
            ActionType::Deny => IntentType::Deny,
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentType::Route => f.write_str("ROUTE"),
            IntentType::Deny => f.write_str("DENY"),
            IntentType::Allow => f.write_str("ALLOW"),
            IntentType::Escalate => f.write_str("ESCALATE"),
            IntentType::Custom(name) => write!(f, "CUSTOM:{}", name),
        }
    }
}

/// A typed description of a desired downstream effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub id: IntentId,
    pub intent_type: IntentType,
    /// Type-specific structured payload (`target_agent`, `reason`, ...).
    pub payload: serde_json::Value,
    pub priority: i64,
    pub source_policy: Option<String>,
    pub requires_confirmation: bool,
    /// Populated by validation. Emitted intents always have none.
    pub validation_errors: Vec<String>,
}

impl Intent {
    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }

    /// String field of the payload, if present.
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(|v| v.as_str())
    }
}
