pub mod enrollment_source;
pub mod memory;

use crate::errors::{BillingError, Result};
use crate::model::{AttendanceRecord, Enrollment, Group, PaymentRecord, Session, Student};
use crate::types::{AttendanceStatus, EnrollmentStatus, GroupId, SessionId, StudentId};

pub use enrollment_source::{EnrollmentSource, ResolutionStrategy, ResolvedEnrollments};
pub use memory::InMemoryStore;

/// result of inserting a payment record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// a record with the same adjustment key already exists
    Duplicate,
}

/// relational store the billing engine reads from and appends to
pub trait BillingStore: Send + Sync {
    fn student(&self, id: StudentId) -> Result<Option<Student>>;

    fn students(&self) -> Result<Vec<Student>>;

    fn group(&self, id: GroupId) -> Result<Option<Group>>;

    fn session(&self, id: SessionId) -> Result<Option<Session>>;

    /// sessions of a group ordered by date
    fn sessions_for_group(&self, group_id: GroupId) -> Result<Vec<Session>>;

    fn enrollments_for_student(&self, student_id: StudentId) -> Result<Vec<Enrollment>>;

    /// set the enrollment status, creating the row if needed; returns the previous status
    fn upsert_enrollment_status(
        &self,
        student_id: StudentId,
        group_id: GroupId,
        status: EnrollmentStatus,
    ) -> Result<Option<EnrollmentStatus>>;

    fn attendance(&self, session_id: SessionId, student_id: StudentId) -> Result<Option<AttendanceRecord>>;

    fn attendance_for_student(&self, student_id: StudentId) -> Result<Vec<AttendanceRecord>>;

    /// latest write wins; the version is bumped only when the status changes
    fn write_attendance(
        &self,
        session_id: SessionId,
        student_id: StudentId,
        status: AttendanceStatus,
    ) -> Result<AttendanceRecord>;

    /// payments of a student in insertion order
    fn payments_for_student(&self, student_id: StudentId) -> Result<Vec<PaymentRecord>>;

    /// append a payment; records carrying an adjustment key already present are refused,
    /// and non-positive amounts fail with `NonPositivePayment`
    fn insert_payment(&self, record: PaymentRecord) -> Result<InsertOutcome>;

    fn require_student(&self, id: StudentId) -> Result<Student> {
        self.student(id)?.ok_or(BillingError::StudentNotFound { id })
    }

    fn require_group(&self, id: GroupId) -> Result<Group> {
        self.group(id)?.ok_or(BillingError::GroupNotFound { id })
    }

    fn require_session(&self, id: SessionId) -> Result<Session> {
        self.session(id)?.ok_or(BillingError::SessionNotFound { id })
    }
}
