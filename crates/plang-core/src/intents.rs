//! Intent bookkeeping for one evaluation.
//!
//! `IntentSystem` owns two sets: intents that have been created but not yet
//! emitted (`pending`) and intents that passed validation and were emitted.
//! An intent moves from pending to emitted at most once; an invalid intent
//! stays pending with its `validation_errors` populated and is never handed
//! to the caller.

use tracing::{debug, warn};

use plang_contracts::intent::{Intent, IntentId, IntentType};

use crate::traits::IntentValidator;

pub struct IntentSystem<'v> {
    validator: &'v dyn IntentValidator,
    pending: Vec<Intent>,
    emitted: Vec<Intent>,
    next_ordinal: u64,
}

impl<'v> IntentSystem<'v> {
    pub fn new(validator: &'v dyn IntentValidator) -> Self {
        Self {
            validator,
            pending: Vec::new(),
            emitted: Vec::new(),
            next_ordinal: 0,
        }
    }

    /// Create a pending intent and return its id.
    ///
    /// Ids are derived from `(source_policy, ordinal, type)`, so the same
    /// evaluation always produces the same ids. Escalations require
    /// confirmation by the enforcement layer.
    pub fn create(
        &mut self,
        intent_type: IntentType,
        payload: serde_json::Value,
        priority: Option<i64>,
        source_policy: Option<&str>,
    ) -> IntentId {
        let id = IntentId::derive(source_policy, self.next_ordinal, &intent_type);
        self.next_ordinal += 1;

        let requires_confirmation = matches!(intent_type, IntentType::Escalate);
        self.pending.push(Intent {
            id: id.clone(),
            intent_type,
            payload,
            priority: priority.unwrap_or(0),
            source_policy: source_policy.map(str::to_string),
            requires_confirmation,
            validation_errors: Vec::new(),
        });
        id
    }

    /// Validate a pending intent, replacing its `validation_errors`.
    ///
    /// Returns false for unknown ids and for intents that were already
    /// emitted (they are no longer subject to validation).
    pub fn validate(&mut self, id: &IntentId) -> bool {
        let validator = self.validator;
        match self.pending.iter_mut().find(|i| &i.id == id) {
            Some(intent) => {
                intent.validation_errors = validator.validate(intent);
                intent.validation_errors.is_empty()
            }
            None => false,
        }
    }

    /// Emit a pending intent if it validates.
    ///
    /// Returns false when the intent is invalid (it stays pending), unknown,
    /// or already emitted.
    pub fn emit(&mut self, id: &IntentId) -> bool {
        if !self.validate(id) {
            if let Some(intent) = self.pending(id) {
                warn!(
                    intent_id = %id,
                    intent_type = %intent.intent_type,
                    errors = ?intent.validation_errors,
                    "intent failed validation and was not emitted"
                );
            }
            return false;
        }

        let Some(index) = self.pending.iter().position(|i| &i.id == id) else {
            return false;
        };
        let intent = self.pending.remove(index);
        debug!(intent_id = %id, intent_type = %intent.intent_type, "intent emitted");
        self.emitted.push(intent);
        true
    }

    pub fn pending(&self, id: &IntentId) -> Option<&Intent> {
        self.pending.iter().find(|i| &i.id == id)
    }

    /// Intents still pending, i.e. created but rejected or not yet emitted.
    pub fn pending_intents(&self) -> &[Intent] {
        &self.pending
    }

    /// Emitted intents in emission order.
    pub fn emitted(&self) -> &[Intent] {
        &self.emitted
    }

    pub fn into_emitted(self) -> Vec<Intent> {
        self.emitted
    }
}
