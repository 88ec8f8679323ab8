use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::Result;
use crate::model::{Enrollment, Student};
use crate::types::{BalanceMode, EnrollmentStatus, GroupId};

use super::BillingStore;

/// how a student's group membership was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// junction rows in the enrollment table
    EnrollmentRows,
    /// denormalized group column on the student
    LegacyColumn,
    /// groups of the sessions the student has attendance for
    AttendanceHistory,
    /// no trace of any group
    None,
}

/// enrollments of one student together with where they came from
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEnrollments {
    pub strategy: ResolutionStrategy,
    pub enrollments: Vec<Enrollment>,
    /// groups seen in attendance history, filled only when there are no rows
    pub attended_groups: Vec<GroupId>,
}

impl ResolvedEnrollments {
    /// every enrollment row is stopped (needs at least one row)
    pub fn is_fully_stopped(&self) -> bool {
        self.strategy == ResolutionStrategy::EnrollmentRows
            && !self.enrollments.is_empty()
            && self.enrollments.iter().all(Enrollment::is_stopped)
    }

    /// calculator variant this membership calls for
    ///
    /// without rows, any attendance history means the student was removed from
    /// a group, even when the legacy column still names one
    pub fn mode(&self) -> BalanceMode {
        match self.strategy {
            ResolutionStrategy::EnrollmentRows if self.is_fully_stopped() => BalanceMode::StoppedStudent,
            ResolutionStrategy::EnrollmentRows => BalanceMode::ActiveStudent,
            _ if !self.attended_groups.is_empty() => BalanceMode::StoppedStudent,
            _ => BalanceMode::ActiveStudent,
        }
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.enrollments.iter().map(|e| e.group_id).collect()
    }

    /// groups billed retrospectively: rows when present, else attendance history
    pub fn retrospective_group_ids(&self) -> Vec<GroupId> {
        if self.strategy == ResolutionStrategy::EnrollmentRows || self.attended_groups.is_empty() {
            self.group_ids()
        } else {
            self.attended_groups.clone()
        }
    }
}

/// resolves group membership through one ordered list of strategies
pub struct EnrollmentSource<'a> {
    store: &'a dyn BillingStore,
}

impl<'a> EnrollmentSource<'a> {
    pub fn new(store: &'a dyn BillingStore) -> Self {
        Self { store }
    }

    pub fn resolve(&self, student: &Student) -> Result<ResolvedEnrollments> {
        let resolved = self.resolve_inner(student)?;
        debug!(
            student = %student.id,
            strategy = ?resolved.strategy,
            groups = resolved.enrollments.len(),
            "enrollments resolved"
        );
        Ok(resolved)
    }

    fn resolve_inner(&self, student: &Student) -> Result<ResolvedEnrollments> {
        let rows = self.store.enrollments_for_student(student.id)?;
        if !rows.is_empty() {
            return Ok(ResolvedEnrollments {
                strategy: ResolutionStrategy::EnrollmentRows,
                enrollments: rows,
                attended_groups: Vec::new(),
            });
        }

        let attended_groups = self.attended_groups(student)?;

        if let Some(group_id) = student.legacy_group_id {
            return Ok(ResolvedEnrollments {
                strategy: ResolutionStrategy::LegacyColumn,
                enrollments: vec![Enrollment::active(student.id, group_id)],
                attended_groups,
            });
        }

        if !attended_groups.is_empty() {
            return Ok(ResolvedEnrollments {
                strategy: ResolutionStrategy::AttendanceHistory,
                enrollments: attended_groups
                    .iter()
                    .map(|&group_id| Enrollment {
                        student_id: student.id,
                        group_id,
                        status: EnrollmentStatus::Stopped,
                    })
                    .collect(),
                attended_groups,
            });
        }

        Ok(ResolvedEnrollments {
            strategy: ResolutionStrategy::None,
            enrollments: Vec::new(),
            attended_groups,
        })
    }

    fn attended_groups(&self, student: &Student) -> Result<Vec<GroupId>> {
        // ordered set keeps the inferred list stable between calls
        let mut groups = BTreeSet::new();
        for record in self.store.attendance_for_student(student.id)? {
            if let Some(session) = self.store.session(record.session_id)? {
                groups.insert(session.group_id);
            }
        }
        Ok(groups.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Session;
    use crate::store::InMemoryStore;
    use crate::types::AttendanceStatus;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
    }

    #[test]
    fn test_rows_take_precedence() {
        let store = InMemoryStore::new();
        let group = Uuid::new_v4();
        let student = Student::new("amina").with_legacy_group(Uuid::new_v4());
        store.insert_enrollment(Enrollment::active(student.id, group)).unwrap();

        let resolved = EnrollmentSource::new(&store).resolve(&student).unwrap();
        assert_eq!(resolved.strategy, ResolutionStrategy::EnrollmentRows);
        assert_eq!(resolved.group_ids(), vec![group]);
        assert_eq!(resolved.mode(), BalanceMode::ActiveStudent);
    }

    #[test]
    fn test_fully_stopped_rows_select_stopped_mode() {
        let store = InMemoryStore::new();
        let student = Student::new("omar");
        for _ in 0..2 {
            store
                .upsert_enrollment_status(student.id, Uuid::new_v4(), EnrollmentStatus::Stopped)
                .unwrap();
        }

        let resolved = EnrollmentSource::new(&store).resolve(&student).unwrap();
        assert!(resolved.is_fully_stopped());
        assert_eq!(resolved.mode(), BalanceMode::StoppedStudent);
    }

    #[test]
    fn test_partially_stopped_stays_active() {
        let store = InMemoryStore::new();
        let student = Student::new("omar");
        store
            .upsert_enrollment_status(student.id, Uuid::new_v4(), EnrollmentStatus::Stopped)
            .unwrap();
        store.insert_enrollment(Enrollment::active(student.id, Uuid::new_v4())).unwrap();

        let resolved = EnrollmentSource::new(&store).resolve(&student).unwrap();
        assert!(!resolved.is_fully_stopped());
        assert_eq!(resolved.mode(), BalanceMode::ActiveStudent);
    }

    #[test]
    fn test_legacy_column_fallback() {
        let store = InMemoryStore::new();
        let group = Uuid::new_v4();
        let student = Student::new("sara").with_legacy_group(group);

        let resolved = EnrollmentSource::new(&store).resolve(&student).unwrap();
        assert_eq!(resolved.strategy, ResolutionStrategy::LegacyColumn);
        assert_eq!(resolved.group_ids(), vec![group]);
        assert_eq!(resolved.mode(), BalanceMode::ActiveStudent);
    }

    #[test]
    fn test_legacy_column_with_history_selects_stopped_mode() {
        let store = InMemoryStore::new();
        let attended = Uuid::new_v4();
        let student = Student::new("karim").with_legacy_group(Uuid::new_v4());
        let session = Session::new(attended, date());
        store.insert_session(session).unwrap();
        store.write_attendance(session.id, student.id, AttendanceStatus::Present).unwrap();

        let resolved = EnrollmentSource::new(&store).resolve(&student).unwrap();
        assert_eq!(resolved.strategy, ResolutionStrategy::LegacyColumn);
        assert_eq!(resolved.mode(), BalanceMode::StoppedStudent);
        assert_eq!(resolved.retrospective_group_ids(), vec![attended]);
    }

    #[test]
    fn test_attendance_history_inference() {
        let store = InMemoryStore::new();
        let group = Uuid::new_v4();
        let student = Student::new("youssef");
        let first = Session::new(group, date());
        let second = Session::new(group, date());
        store.insert_session(first).unwrap();
        store.insert_session(second).unwrap();
        store.write_attendance(first.id, student.id, AttendanceStatus::Present).unwrap();
        store.write_attendance(second.id, student.id, AttendanceStatus::Absent).unwrap();

        let resolved = EnrollmentSource::new(&store).resolve(&student).unwrap();
        assert_eq!(resolved.strategy, ResolutionStrategy::AttendanceHistory);
        assert_eq!(resolved.group_ids(), vec![group]);
        assert_eq!(resolved.mode(), BalanceMode::StoppedStudent);
    }

    #[test]
    fn test_no_membership() {
        let store = InMemoryStore::new();
        let student = Student::new("nadia");

        let resolved = EnrollmentSource::new(&store).resolve(&student).unwrap();
        assert_eq!(resolved.strategy, ResolutionStrategy::None);
        assert_eq!(resolved.mode(), BalanceMode::ActiveStudent);
    }
}
