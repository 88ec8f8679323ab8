use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::{BillingError, Result};
use crate::model::{AttendanceRecord, Enrollment, Group, PaymentRecord, Session, Student};
use crate::types::{
    AdjustmentKey, AttendanceStatus, EnrollmentStatus, GroupId, SessionId, StudentId,
};

use super::{BillingStore, InsertOutcome};

#[derive(Debug, Default)]
struct Tables {
    students: HashMap<StudentId, Student>,
    groups: HashMap<GroupId, Group>,
    sessions: HashMap<SessionId, Session>,
    enrollments: Vec<Enrollment>,
    attendance: HashMap<(SessionId, StudentId), AttendanceRecord>,
    payments: Vec<PaymentRecord>,
    adjustment_keys: HashSet<AdjustmentKey>,
}

/// in-memory store, used by tests and demos in place of the school database
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| BillingError::store("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| BillingError::store("in-memory store lock poisoned"))
    }

    // seeding, standing in for the school's CRUD screens

    pub fn insert_student(&self, student: Student) -> Result<()> {
        self.write()?.students.insert(student.id, student);
        Ok(())
    }

    pub fn insert_group(&self, group: Group) -> Result<()> {
        self.write()?.groups.insert(group.id, group);
        Ok(())
    }

    pub fn insert_session(&self, session: Session) -> Result<()> {
        self.write()?.sessions.insert(session.id, session);
        Ok(())
    }

    pub fn insert_enrollment(&self, enrollment: Enrollment) -> Result<()> {
        let mut tables = self.write()?;
        tables
            .enrollments
            .retain(|e| !(e.student_id == enrollment.student_id && e.group_id == enrollment.group_id));
        tables.enrollments.push(enrollment);
        Ok(())
    }

    pub fn remove_enrollment(&self, student_id: StudentId, group_id: GroupId) -> Result<()> {
        self.write()?
            .enrollments
            .retain(|e| !(e.student_id == student_id && e.group_id == group_id));
        Ok(())
    }

    pub fn remove_group(&self, group_id: GroupId) -> Result<()> {
        self.write()?.groups.remove(&group_id);
        Ok(())
    }

    /// every payment in insertion order
    pub fn all_payments(&self) -> Result<Vec<PaymentRecord>> {
        Ok(self.read()?.payments.clone())
    }
}

impl BillingStore for InMemoryStore {
    fn student(&self, id: StudentId) -> Result<Option<Student>> {
        Ok(self.read()?.students.get(&id).cloned())
    }

    fn students(&self) -> Result<Vec<Student>> {
        let mut students: Vec<Student> = self.read()?.students.values().cloned().collect();
        students.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(students)
    }

    fn group(&self, id: GroupId) -> Result<Option<Group>> {
        Ok(self.read()?.groups.get(&id).cloned())
    }

    fn session(&self, id: SessionId) -> Result<Option<Session>> {
        Ok(self.read()?.sessions.get(&id).copied())
    }

    fn sessions_for_group(&self, group_id: GroupId) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .read()?
            .sessions
            .values()
            .filter(|s| s.group_id == group_id)
            .copied()
            .collect();
        sessions.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    fn enrollments_for_student(&self, student_id: StudentId) -> Result<Vec<Enrollment>> {
        Ok(self
            .read()?
            .enrollments
            .iter()
            .filter(|e| e.student_id == student_id)
            .copied()
            .collect())
    }

    fn upsert_enrollment_status(
        &self,
        student_id: StudentId,
        group_id: GroupId,
        status: EnrollmentStatus,
    ) -> Result<Option<EnrollmentStatus>> {
        let mut tables = self.write()?;
        match tables
            .enrollments
            .iter_mut()
            .find(|e| e.student_id == student_id && e.group_id == group_id)
        {
            Some(existing) => {
                let previous = existing.status;
                existing.status = status;
                Ok(Some(previous))
            }
            None => {
                tables.enrollments.push(Enrollment {
                    student_id,
                    group_id,
                    status,
                });
                Ok(None)
            }
        }
    }

    fn attendance(&self, session_id: SessionId, student_id: StudentId) -> Result<Option<AttendanceRecord>> {
        Ok(self.read()?.attendance.get(&(session_id, student_id)).copied())
    }

    fn attendance_for_student(&self, student_id: StudentId) -> Result<Vec<AttendanceRecord>> {
        Ok(self
            .read()?
            .attendance
            .values()
            .filter(|a| a.student_id == student_id)
            .copied()
            .collect())
    }

    fn write_attendance(
        &self,
        session_id: SessionId,
        student_id: StudentId,
        status: AttendanceStatus,
    ) -> Result<AttendanceRecord> {
        let mut tables = self.write()?;
        let record = tables
            .attendance
            .entry((session_id, student_id))
            .and_modify(|existing| {
                if existing.status != status {
                    existing.status = status;
                    existing.version += 1;
                }
            })
            .or_insert(AttendanceRecord {
                session_id,
                student_id,
                status,
                version: 1,
            });
        Ok(*record)
    }

    fn payments_for_student(&self, student_id: StudentId) -> Result<Vec<PaymentRecord>> {
        Ok(self
            .read()?
            .payments
            .iter()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect())
    }

    fn insert_payment(&self, record: PaymentRecord) -> Result<InsertOutcome> {
        if !record.amount.is_positive() {
            return Err(BillingError::NonPositivePayment {
                amount: record.amount,
            });
        }
        let mut tables = self.write()?;
        if let Some(key) = record.source.adjustment_key() {
            if !tables.adjustment_keys.insert(key) {
                return Ok(InsertOutcome::Duplicate);
            }
        }
        tables.payments.push(record);
        Ok(InsertOutcome::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;
    use crate::types::{PaymentKind, PaymentSource};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, day).unwrap()
    }

    #[test]
    fn test_attendance_version_bumps_on_change_only() {
        let store = InMemoryStore::new();
        let session = Uuid::new_v4();
        let student = Uuid::new_v4();

        let first = store.write_attendance(session, student, AttendanceStatus::Present).unwrap();
        assert_eq!(first.version, 1);

        let replay = store.write_attendance(session, student, AttendanceStatus::Present).unwrap();
        assert_eq!(replay.version, 1);

        let changed = store.write_attendance(session, student, AttendanceStatus::Justified).unwrap();
        assert_eq!(changed.version, 2);
        assert_eq!(
            store.attendance(session, student).unwrap().unwrap().status,
            AttendanceStatus::Justified
        );
    }

    #[test]
    fn test_duplicate_adjustment_key_refused() {
        let store = InMemoryStore::new();
        let student = Uuid::new_v4();
        let key = AdjustmentKey {
            session_id: Uuid::new_v4(),
            student_id: student,
            status: AttendanceStatus::Justified,
            version: 1,
        };
        let record = PaymentRecord::new(
            student,
            Some(Uuid::new_v4()),
            PaymentKind::AttendanceCredit,
            Money::from_major(100),
            date(1),
            PaymentSource::Attendance { key },
        );

        assert_eq!(store.insert_payment(record.clone()).unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert_payment(record).unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.payments_for_student(student).unwrap().len(), 1);
    }

    #[test]
    fn test_non_positive_payment_refused() {
        let store = InMemoryStore::new();
        let student = Uuid::new_v4();
        for amount in [Money::ZERO, Money::from_major(-250)] {
            let record = PaymentRecord::new(
                student,
                None,
                PaymentKind::BalanceAddition,
                amount,
                date(3),
                PaymentSource::Imported,
            );
            let err = store.insert_payment(record).unwrap_err();
            assert!(matches!(err, BillingError::NonPositivePayment { .. }));
        }
        assert!(store.all_payments().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_enrollment_returns_previous() {
        let store = InMemoryStore::new();
        let student = Uuid::new_v4();
        let group = Uuid::new_v4();

        let previous = store
            .upsert_enrollment_status(student, group, EnrollmentStatus::Stopped)
            .unwrap();
        assert_eq!(previous, None);

        let previous = store
            .upsert_enrollment_status(student, group, EnrollmentStatus::Active)
            .unwrap();
        assert_eq!(previous, Some(EnrollmentStatus::Stopped));
        assert_eq!(store.enrollments_for_student(student).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_enrollment_and_payment_log() {
        let store = InMemoryStore::new();
        let student = Uuid::new_v4();
        let group = Uuid::new_v4();
        store.insert_enrollment(Enrollment::active(student, group)).unwrap();
        store.remove_enrollment(student, group).unwrap();
        assert!(store.enrollments_for_student(student).unwrap().is_empty());

        for owner in [student, Uuid::new_v4()] {
            let record = PaymentRecord::new(
                owner,
                None,
                PaymentKind::BalanceAddition,
                Money::from_major(10),
                date(2),
                PaymentSource::Imported,
            );
            store.insert_payment(record).unwrap();
        }
        assert_eq!(store.all_payments().unwrap().len(), 2);
        assert_eq!(store.payments_for_student(student).unwrap().len(), 1);
    }

    #[test]
    fn test_sessions_ordered_by_date() {
        let store = InMemoryStore::new();
        let group = Uuid::new_v4();
        store.insert_session(Session::new(group, date(20))).unwrap();
        store.insert_session(Session::new(group, date(5))).unwrap();
        store.insert_session(Session::new(Uuid::new_v4(), date(1))).unwrap();

        let sessions = store.sessions_for_group(group).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].date, date(5));
    }

    #[test]
    fn test_require_helpers_report_not_found() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();

        assert!(matches!(store.require_student(id), Err(BillingError::StudentNotFound { .. })));
        assert!(matches!(store.require_group(id), Err(BillingError::GroupNotFound { .. })));
        assert!(matches!(store.require_session(id), Err(BillingError::SessionNotFound { .. })));
    }
}
