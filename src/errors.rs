use thiserror::Error;

use crate::decimal::Money;
use crate::types::{GroupId, PaymentId, SessionId, StudentId};

/// broad error families, used to decide how an error surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Validation,
    DataInconsistency,
    StoreFailure,
}

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("student not found: {id}")]
    StudentNotFound {
        id: StudentId,
    },

    #[error("group not found: {id}")]
    GroupNotFound {
        id: GroupId,
    },

    #[error("session not found: {id}")]
    SessionNotFound {
        id: SessionId,
    },

    #[error("group price missing: {group_id}")]
    MissingGroupPrice {
        group_id: GroupId,
    },

    #[error("group total sessions missing: {group_id}")]
    MissingTotalSessions {
        group_id: GroupId,
    },

    #[error("unrecognized attendance status: {value}")]
    UnknownAttendanceStatus {
        value: String,
    },

    #[error("invalid deposit amount: {amount}")]
    InvalidDepositAmount {
        amount: Money,
    },

    #[error("payment amount must be positive: {amount}")]
    NonPositivePayment {
        amount: Money,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("payment {payment_id} references unknown group {group_id}")]
    PaymentForUnknownGroup {
        payment_id: PaymentId,
        group_id: GroupId,
    },

    #[error("enrollment of student {student_id} references unknown group {group_id}")]
    EnrollmentWithoutGroup {
        student_id: StudentId,
        group_id: GroupId,
    },

    #[error("store failure: {message}")]
    Store {
        message: String,
    },
}

impl BillingError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BillingError::StudentNotFound { .. }
            | BillingError::GroupNotFound { .. }
            | BillingError::SessionNotFound { .. } => ErrorCategory::NotFound,
            BillingError::MissingGroupPrice { .. }
            | BillingError::MissingTotalSessions { .. }
            | BillingError::UnknownAttendanceStatus { .. }
            | BillingError::InvalidDepositAmount { .. }
            | BillingError::NonPositivePayment { .. }
            | BillingError::InvalidConfiguration { .. } => ErrorCategory::Validation,
            BillingError::PaymentForUnknownGroup { .. }
            | BillingError::EnrollmentWithoutGroup { .. } => ErrorCategory::DataInconsistency,
            BillingError::Store { .. } => ErrorCategory::StoreFailure,
        }
    }

    pub(crate) fn store(message: impl Into<String>) -> Self {
        BillingError::Store {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_categories() {
        let id = Uuid::new_v4();

        assert_eq!(BillingError::SessionNotFound { id }.category(), ErrorCategory::NotFound);
        assert_eq!(
            BillingError::MissingGroupPrice { group_id: id }.category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            BillingError::EnrollmentWithoutGroup { student_id: id, group_id: id }.category(),
            ErrorCategory::DataInconsistency
        );
        assert_eq!(BillingError::store("down").category(), ErrorCategory::StoreFailure);
    }

    #[test]
    fn test_missing_price_message() {
        let id = Uuid::new_v4();
        let message = BillingError::MissingGroupPrice { group_id: id }.to_string();
        assert!(message.starts_with("group price missing"));
    }
}
