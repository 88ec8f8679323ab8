use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::BillingError;

pub type StudentId = Uuid;
pub type GroupId = Uuid;
pub type SessionId = Uuid;
pub type PaymentId = Uuid;
/// shared by every record created from one deposit
pub type DepositId = Uuid;

/// attendance status of one student at one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    TooLate,
    /// absence excused by the school
    Justified,
    /// student moved to another group for this session
    Change,
    /// session before the student joined
    New,
    /// student left the group at this session
    Stop,
    Default,
}

/// whether a session must be paid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceCategory {
    Obligatory,
    Free,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 8] = [
        AttendanceStatus::Present,
        AttendanceStatus::Absent,
        AttendanceStatus::TooLate,
        AttendanceStatus::Justified,
        AttendanceStatus::Change,
        AttendanceStatus::New,
        AttendanceStatus::Stop,
        AttendanceStatus::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::TooLate => "too_late",
            AttendanceStatus::Justified => "justified",
            AttendanceStatus::Change => "change",
            AttendanceStatus::New => "new",
            AttendanceStatus::Stop => "stop",
            AttendanceStatus::Default => "default",
        }
    }

    pub fn category(&self) -> AttendanceCategory {
        match self {
            AttendanceStatus::Present | AttendanceStatus::Absent | AttendanceStatus::TooLate => {
                AttendanceCategory::Obligatory
            }
            _ => AttendanceCategory::Free,
        }
    }

    pub fn is_obligatory(&self) -> bool {
        self.category() == AttendanceCategory::Obligatory
    }

    /// statuses that credit one session fee back to the student
    pub fn is_session_credit(&self) -> bool {
        matches!(
            self,
            AttendanceStatus::Justified | AttendanceStatus::New | AttendanceStatus::Change
        )
    }
}

/// category of an optional status; a session without attendance is free
pub fn category_of(status: Option<AttendanceStatus>) -> AttendanceCategory {
    status
        .map(|s| s.category())
        .unwrap_or(AttendanceCategory::Free)
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        AttendanceStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| BillingError::UnknownAttendanceStatus {
                value: s.to_string(),
            })
    }
}

/// enrollment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Stopped,
}

/// payment record kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    RegistrationFee,
    GroupPayment,
    /// deposit left over after every obligation was paid
    BalanceAddition,
    /// reduction of what is owed for a non-chargeable session
    AttendanceCredit,
    /// refundable excess
    BalanceCredit,
    /// money paid back out to the student (imported only)
    Refund,
    /// settlement of an outstanding debt (imported only)
    DebtPayment,
}

impl PaymentKind {
    /// real money received, as opposed to fees and attendance adjustments
    pub fn is_money(&self) -> bool {
        matches!(
            self,
            PaymentKind::GroupPayment | PaymentKind::BalanceAddition | PaymentKind::DebtPayment
        )
    }

    pub fn is_adjustment(&self) -> bool {
        matches!(self, PaymentKind::AttendanceCredit | PaymentKind::BalanceCredit)
    }

    /// counts towards unallocated credit when not tagged to a group
    pub fn is_pure_deposit(&self) -> bool {
        !matches!(
            self,
            PaymentKind::RegistrationFee | PaymentKind::Refund | PaymentKind::DebtPayment
        )
    }
}

/// which calculator produced a balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceMode {
    /// live obligations, credit netted against unpaid amounts
    ActiveStudent,
    /// obligations rebuilt from attendance history, reported as a debt magnitude
    StoppedStudent,
}

/// idempotency key of an attendance-driven adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdjustmentKey {
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub status: AttendanceStatus,
    /// attendance record version the adjustment was computed from
    pub version: u64,
}

impl fmt::Display for AdjustmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:v{}",
            self.session_id, self.student_id, self.status, self.version
        )
    }
}

/// where the money behind a payment record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentSource {
    Deposit { deposit_id: DepositId },
    ExistingCredit,
    Attendance { key: AdjustmentKey },
    StopAdjustment { key: AdjustmentKey },
    Imported,
}

impl PaymentSource {
    pub fn adjustment_key(&self) -> Option<AdjustmentKey> {
        match self {
            PaymentSource::Attendance { key } | PaymentSource::StopAdjustment { key } => Some(*key),
            _ => None,
        }
    }

    pub fn deposit_id(&self) -> Option<DepositId> {
        match self {
            PaymentSource::Deposit { deposit_id } => Some(*deposit_id),
            _ => None,
        }
    }
}
