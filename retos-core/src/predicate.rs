//! Reward eligibility predicates.
//!
//! A reward's condition is a small declarative conjunction of optional
//! minimum-level / minimum-score clauses, stored as JSON on the catalog
//! row and parsed at evaluation time. Parsing is strict: wrong types or
//! negative thresholds make the condition malformed, which skips the
//! single rule carrying it.

use crate::error::RuleError;
use crate::User;
use serde_json::Value as JsonValue;

/// Parsed eligibility predicate: conjunction of optional clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EligibilityPredicate {
    pub min_level: Option<i64>,
    pub min_score: Option<i64>,
}

impl EligibilityPredicate {
    /// Predicate with no clauses; satisfied by every user.
    pub fn always() -> Self {
        Self::default()
    }

    /// Parse condition data from a catalog row.
    ///
    /// Accepts a JSON object with optional `min_level` / `min_score`
    /// non-negative integer fields. Anything else is malformed.
    pub fn parse(condition: &JsonValue) -> Result<Self, RuleError> {
        let object = condition.as_object().ok_or_else(|| RuleError::MalformedCondition {
            reason: "condition must be a JSON object".to_string(),
        })?;

        let mut predicate = Self::default();
        for (key, value) in object {
            let threshold = value.as_i64().filter(|v| *v >= 0).ok_or_else(|| {
                RuleError::MalformedCondition {
                    reason: format!("'{}' must be a non-negative integer", key),
                }
            })?;
            match key.as_str() {
                "min_level" => predicate.min_level = Some(threshold),
                "min_score" => predicate.min_score = Some(threshold),
                other => {
                    return Err(RuleError::MalformedCondition {
                        reason: format!("unknown clause '{}'", other),
                    })
                }
            }
        }
        Ok(predicate)
    }

    /// Evaluate the conjunction against the user's current score/level.
    pub fn satisfied_by(&self, user: &User) -> bool {
        if let Some(min_level) = self.min_level {
            if user.level() < min_level {
                return false;
            }
        }
        if let Some(min_score) = self.min_score {
            if user.score < min_score {
                return false;
            }
        }
        true
    }
}
