//! Business layer errors
//!
//! Uses anyhow for error aggregation with custom error types. Every failure
//! a caller can act on is a `BusinessError`; `error_kind` classifies any
//! error chain coming out of a service.

use rust_decimal::Decimal;
use sacco_core::CoreError;
use sacco_persistence::PersistenceError;
use std::fmt;
use thiserror::Error;

/// Business operation errors
#[derive(Debug, Error)]
pub enum BusinessError {
    // === Validation errors ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // === Policy errors ===
    #[error("Not eligible: {}", reasons.join("; "))]
    Ineligible { reasons: Vec<String> },

    #[error("Guarantor shortfall: {pledged}% pledged, {required}% required")]
    GuarantorShortfall { required: Decimal, pledged: Decimal },

    #[error("Overpayment: outstanding {outstanding}, attempted {attempted}")]
    Overpayment {
        outstanding: Decimal,
        attempted: Decimal,
    },

    #[error("Share capital limit exceeded: limit {limit}, confirmed {current}, attempted {attempted}")]
    ShareCapitalLimitExceeded {
        limit: Decimal,
        current: Decimal,
        attempted: Decimal,
    },

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    // === State errors ===
    #[error("Cannot {action} {entity} in status '{from}'")]
    InvalidTransition {
        entity: String,
        from: String,
        action: String,
    },

    // === Lookup / permission errors ===
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Permission denied for {actor}: {operation}")]
    PermissionDenied { actor: String, operation: String },

    // === Wrapped errors ===
    #[error("Persistence error: {0}")]
    Persistence(PersistenceError),

    #[error("Core error: {0}")]
    Core(CoreError),
}

/// Result type alias for business operations
pub type BusinessResult<T> = anyhow::Result<T>;

/// Coarse classification callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Policy,
    State,
    NotFound,
    Permission,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Policy => "policy",
            ErrorKind::State => "state",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Permission => "permission",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl BusinessError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn permission_denied(actor: &str, operation: &str) -> Self {
        Self::PermissionDenied {
            actor: actor.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn invalid_transition(entity: &str, from: &str, action: &str) -> Self {
        Self::InvalidTransition {
            entity: entity.to_string(),
            from: from.to_string(),
            action: action.to_string(),
        }
    }

    pub fn insufficient_balance(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientBalance {
            required,
            available,
        }
    }

    pub fn ineligible(reasons: Vec<String>) -> Self {
        Self::Ineligible { reasons }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::Ineligible { .. }
            | Self::GuarantorShortfall { .. }
            | Self::Overpayment { .. }
            | Self::ShareCapitalLimitExceeded { .. }
            | Self::InsufficientBalance { .. } => ErrorKind::Policy,
            Self::InvalidTransition { .. } => ErrorKind::State,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PermissionDenied { .. } => ErrorKind::Permission,
            Self::Persistence(e) => persistence_kind(e),
            Self::Core(e) => core_kind(e),
        }
    }
}

fn persistence_kind(err: &PersistenceError) -> ErrorKind {
    match err {
        PersistenceError::NotFound { .. } => ErrorKind::NotFound,
        PersistenceError::StaleUpdate { .. } => ErrorKind::State,
        PersistenceError::AlreadyExists { .. } => ErrorKind::Validation,
        PersistenceError::Domain(e) => core_kind(e),
        e if e.is_unique_violation() => ErrorKind::Validation,
        _ => ErrorKind::Internal,
    }
}

fn core_kind(err: &CoreError) -> ErrorKind {
    match err {
        CoreError::InvalidTransition { .. } => ErrorKind::State,
        CoreError::InsufficientBalance { .. } | CoreError::Overpayment { .. } => ErrorKind::Policy,
        CoreError::Schedule(_) => ErrorKind::Internal,
        _ => ErrorKind::Validation,
    }
}

/// Classify any error returned by a service, looking through context layers.
pub fn error_kind(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<BusinessError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<PersistenceError>() {
            return persistence_kind(e);
        }
        if let Some(e) = cause.downcast_ref::<CoreError>() {
            return core_kind(e);
        }
    }
    ErrorKind::Internal
}

impl From<CoreError> for BusinessError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidAmount(msg) => Self::InvalidAmount(msg),
            CoreError::ValidationError(msg) => Self::Validation(msg),
            CoreError::InsufficientBalance { needed, available } => Self::InsufficientBalance {
                required: needed,
                available,
            },
            CoreError::Overpayment {
                outstanding,
                attempted,
            } => Self::Overpayment {
                outstanding,
                attempted,
            },
            CoreError::InvalidTransition { entity, from, action } => {
                Self::InvalidTransition { entity, from, action }
            }
            other => Self::Core(other),
        }
    }
}

impl From<PersistenceError> for BusinessError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound { entity, id } => Self::NotFound { entity, id },
            PersistenceError::StaleUpdate { entity, id, expected } => Self::InvalidTransition {
                entity,
                from: format!("not {}", expected),
                action: format!("update {}", id),
            },
            PersistenceError::Domain(e) => e.into(),
            other => Self::Persistence(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ineligible_lists_reasons() {
        let err = BusinessError::ineligible(vec!["tenure too short".into(), "loan in progress".into()]);
        assert_eq!(err.to_string(), "Not eligible: tenure too short; loan in progress");
        assert_eq!(err.kind(), ErrorKind::Policy);
    }

    #[test]
    fn test_core_errors_are_mapped() {
        let err: BusinessError = CoreError::invalid_transition("Investment", "confirmed", "confirm").into();
        assert!(matches!(err, BusinessError::InvalidTransition { .. }));
        assert_eq!(err.kind(), ErrorKind::State);

        let err: BusinessError = CoreError::Overpayment {
            outstanding: dec!(10),
            attempted: dec!(11),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Policy);
    }

    #[test]
    fn test_error_kind_through_anyhow() {
        let err: anyhow::Error = PersistenceError::not_found("Loan", "LOAN_0001").into();
        assert_eq!(error_kind(&err), ErrorKind::NotFound);

        let err = anyhow::Error::new(BusinessError::permission_denied("MEM_0002", "approve loan"))
            .context("approving loan");
        assert_eq!(error_kind(&err), ErrorKind::Permission);
    }
}
