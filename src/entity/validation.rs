//! # Field Validation
//!
//! A small rule collector used by `Entity::validate` implementations. Rules are
//! chained on a `Validator` and every failing field is reported at once, the
//! same way configuration validation gathers all problems before failing.

use super::{EntityId, EntityMeta};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single failed field constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

/// Field constraints unmet for an entity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity_type}: {}", format_errors(.errors))]
pub struct ValidationError {
    pub entity_type: String,
    pub errors: Vec<FieldError>,
}

fn format_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn new<S: Into<String>>(entity_type: S, errors: Vec<FieldError>) -> Self {
        Self {
            entity_type: entity_type.into(),
            errors,
        }
    }

    /// Whether a given field is among the failures
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Fold another error for the same entity into this one
    pub fn merge(mut self, other: ValidationError) -> Self {
        self.errors.extend(other.errors);
        self
    }
}

/// Chainable collector of field rules
#[derive(Debug)]
pub struct Validator {
    entity_type: &'static str,
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new(entity_type: &'static str) -> Self {
        Self {
            entity_type,
            errors: Vec::new(),
        }
    }

    /// Record a failure when `ok` is false
    pub fn check(mut self, field: &str, ok: bool, message: &str) -> Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    /// String must be non-empty after trimming
    pub fn required(self, field: &str, value: &str) -> Self {
        self.check(field, !value.trim().is_empty(), "is required")
    }

    /// Identifier must have been assigned
    pub fn required_id(self, field: &str, value: &EntityId) -> Self {
        self.check(field, !value.is_empty(), "is required")
    }

    /// Value must lie strictly between `min` and `max`
    pub fn range_exclusive<T>(mut self, field: &str, value: T, min: T, max: T) -> Self
    where
        T: PartialOrd + fmt::Display,
    {
        if value <= min || value >= max {
            self.errors.push(FieldError::new(
                field,
                format!("must be greater than {} and less than {} (got {})", min, max, value),
            ));
        }
        self
    }

    /// String may not exceed `max` characters
    pub fn max_len(mut self, field: &str, value: &str, max: usize) -> Self {
        let len = value.chars().count();
        if len > max {
            self.errors.push(FieldError::new(
                field,
                format!("must be at most {} characters (got {})", max, len),
            ));
        }
        self
    }

    /// Non-empty string must match `pattern`
    pub fn pattern(mut self, field: &str, value: &str, pattern: &Regex) -> Self {
        if !value.is_empty() && !pattern.is_match(value) {
            self.errors.push(FieldError::new(
                field,
                format!("must match pattern {}", pattern.as_str()),
            ));
        }
        self
    }

    /// Identity and timestamp invariants shared by every entity
    pub fn meta(self, meta: &EntityMeta) -> Self {
        self.required_id("_id", &meta.id)
            .check("created_at", meta.created_at.timestamp() != 0, "is required")
            .check("updated_at", meta.updated_at.timestamp() != 0, "is required")
            .check(
                "updated_at",
                meta.updated_at >= meta.created_at,
                "must not be earlier than created_at",
            )
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.entity_type, self.errors))
        }
    }
}
