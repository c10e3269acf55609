//! # Error Module
//!
//! Domain errors for the SACCO core, built on thiserror.

use rust_decimal::Decimal;
use thiserror::Error;

/// Core domain errors.
///
/// Pure business-rule failures, independent of storage.
#[derive(Debug, Error)]
pub enum CoreError {
    // === Money errors ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance: need {needed}, available {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("Payment of {attempted} exceeds outstanding balance {outstanding}")]
    Overpayment {
        outstanding: Decimal,
        attempted: Decimal,
    },

    // === State errors ===
    #[error("Cannot {action} {entity} in status '{from}'")]
    InvalidTransition {
        entity: String,
        from: String,
        action: String,
    },

    // === Validation errors ===
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid {field}: {value}")]
    InvalidEnumValue { field: String, value: String },

    #[error("Schedule error: {0}")]
    Schedule(String),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Build an invalid transition error
    pub fn invalid_transition(entity: &str, from: &str, action: &str) -> Self {
        Self::InvalidTransition {
            entity: entity.to_string(),
            from: from.to_string(),
            action: action.to_string(),
        }
    }

    /// Build an invalid enum value error
    pub fn invalid_enum(field: &str, value: &str) -> Self {
        Self::InvalidEnumValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_) | Self::ValidationError(_) | Self::InvalidEnumValue { .. }
        )
    }
}
