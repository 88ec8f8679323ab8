use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Percent};
use crate::types::{
    AttendanceStatus, EnrollmentStatus, GroupId, PaymentId, PaymentKind, PaymentSource, SessionId,
    StudentId,
};

/// student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    /// applied to every obligation of the student
    pub default_discount: Percent,
    /// denormalized group column kept from before enrollments existed
    pub legacy_group_id: Option<GroupId>,
}

impl Student {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            default_discount: Percent::ZERO,
            legacy_group_id: None,
        }
    }

    pub fn with_discount(mut self, discount: Percent) -> Self {
        self.default_discount = discount;
        self
    }

    pub fn with_legacy_group(mut self, group_id: GroupId) -> Self {
        self.legacy_group_id = Some(group_id);
        self
    }
}

/// group (course); price is the full course fee, not per session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub price: Option<Money>,
    pub total_sessions: Option<u32>,
    pub start_date: NaiveDate,
}

impl Group {
    pub fn new(
        name: impl Into<String>,
        price: Money,
        total_sessions: u32,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            price: Some(price),
            total_sessions: Some(total_sessions),
            start_date,
        }
    }
}

/// a student's membership in one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: StudentId,
    pub group_id: GroupId,
    pub status: EnrollmentStatus,
}

impl Enrollment {
    pub fn active(student_id: StudentId, group_id: GroupId) -> Self {
        Self {
            student_id,
            group_id,
            status: EnrollmentStatus::Active,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.status == EnrollmentStatus::Stopped
    }
}

/// one scheduled session of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub group_id: GroupId,
    pub date: NaiveDate,
}

impl Session {
    pub fn new(group_id: GroupId, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            date,
        }
    }
}

/// latest attendance of one student at one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub status: AttendanceStatus,
    /// bumped each time the stored status changes
    pub version: u64,
}

/// immutable payment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub student_id: StudentId,
    pub group_id: Option<GroupId>,
    pub amount: Money,
    pub kind: PaymentKind,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub discount_percent: Percent,
    /// amount before the discount
    pub original_amount: Money,
    /// placeholder rows written by the system rather than a cashier
    pub system_generated: bool,
    pub source: PaymentSource,
    pub admin: Option<String>,
}

impl PaymentRecord {
    pub fn new(
        student_id: StudentId,
        group_id: Option<GroupId>,
        kind: PaymentKind,
        amount: Money,
        date: NaiveDate,
        source: PaymentSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            group_id,
            amount,
            kind,
            date,
            notes: None,
            discount_percent: Percent::ZERO,
            original_amount: amount,
            system_generated: false,
            source,
            admin: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// record the discount that turned `original_amount` into `amount`
    pub fn with_discount(mut self, discount: Percent) -> Self {
        self.discount_percent = discount;
        self.original_amount = self.amount.undiscounted(discount);
        self
    }

    pub fn with_admin(mut self, admin: Option<String>) -> Self {
        self.admin = admin;
        self
    }

    pub fn has_notes(&self) -> bool {
        self.notes
            .as_deref()
            .map(|n| !n.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn is_unassigned(&self) -> bool {
        self.group_id.is_none()
    }

    pub fn is_for_group(&self, group_id: GroupId) -> bool {
        self.group_id == Some(group_id)
    }
}
