use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use tracing::{debug, info, warn};

use crate::config::BillingConfig;
use crate::decimal::Money;
use crate::errors::Result;
use crate::events::{Event, EventStore};
use crate::model::{AttendanceRecord, PaymentRecord, Session};
use crate::store::{BillingStore, InsertOutcome};
use crate::types::{
    AdjustmentKey, AttendanceStatus, EnrollmentStatus, PaymentKind, PaymentSource, SessionId,
    StudentId,
};

use super::balance::group_paid;
use super::obligation::{require_price, session_fee};
use super::retrospective::{StopAdjuster, StopAdjustment};
use super::AdjustmentOutcome;

/// everything one attendance write changed
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceOutcome {
    pub record: AttendanceRecord,
    pub adjustment: AdjustmentOutcome,
    /// figures of the stop adjustment, for `stop` writes
    pub stop: Option<StopAdjustment>,
    pub enrollment_status: EnrollmentStatus,
    pub previous_enrollment_status: Option<EnrollmentStatus>,
}

impl AttendanceOutcome {
    pub fn enrollment_changed(&self) -> bool {
        self.previous_enrollment_status != Some(self.enrollment_status)
    }
}

/// writes attendance and the financial adjustment its status calls for
pub struct AttendanceAdjuster<'a> {
    store: &'a dyn BillingStore,
    config: &'a BillingConfig,
}

impl<'a> AttendanceAdjuster<'a> {
    pub fn new(store: &'a dyn BillingStore, config: &'a BillingConfig) -> Self {
        Self { store, config }
    }

    pub fn process(
        &self,
        session_id: SessionId,
        student_id: StudentId,
        status: AttendanceStatus,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<AttendanceOutcome> {
        let session = self.store.require_session(session_id)?;
        self.store.require_student(student_id)?;

        let record = self.store.write_attendance(session_id, student_id, status)?;
        let timestamp = time_provider.now();
        events.emit(Event::AttendanceRecorded {
            student_id,
            session_id,
            status,
            version: record.version,
            timestamp,
        });

        let key = AdjustmentKey {
            session_id,
            student_id,
            status,
            version: record.version,
        };

        let (adjustment, stop) = match status {
            AttendanceStatus::Stop => {
                match StopAdjuster::new(self.store, self.config).process(&session, student_id, key) {
                    Ok(stop) => (stop.outcome.clone(), Some(stop)),
                    Err(e) => (self.failed(&key, &e.to_string()), None),
                }
            }
            s if s.is_session_credit() => match self.session_credit(&session, key) {
                Ok(outcome) => (outcome, None),
                Err(e) => (self.failed(&key, &e.to_string()), None),
            },
            _ => (AdjustmentOutcome::NoChange, None),
        };

        emit_adjustment(events, &session, &key, &adjustment, timestamp);

        let enrollment_status = if status == AttendanceStatus::Stop {
            EnrollmentStatus::Stopped
        } else {
            EnrollmentStatus::Active
        };
        let previous_enrollment_status =
            self.store
                .upsert_enrollment_status(student_id, session.group_id, enrollment_status)?;
        if previous_enrollment_status != Some(enrollment_status) {
            events.emit(Event::EnrollmentStatusChanged {
                student_id,
                group_id: session.group_id,
                old_status: previous_enrollment_status,
                new_status: enrollment_status,
                timestamp,
            });
        }

        debug!(
            student = %student_id,
            session = %session_id,
            status = %status,
            version = record.version,
            "attendance recorded"
        );

        Ok(AttendanceOutcome {
            record,
            adjustment,
            stop,
            enrollment_status,
            previous_enrollment_status,
        })
    }

    /// one undiscounted session fee, refundable once the group is fully paid
    ///
    /// while the student is active a balance credit only raises the group's
    /// paid figure; it becomes visible as a refund after the student stops
    fn session_credit(&self, session: &Session, key: AdjustmentKey) -> Result<AdjustmentOutcome> {
        let group = self.store.require_group(session.group_id)?;
        let fee = session_fee(&group)?;
        let price = require_price(&group)?;
        if !fee.is_positive() {
            return Ok(AdjustmentOutcome::NoChange);
        }

        let payments = self.store.payments_for_student(key.student_id)?;
        let paid = group_paid(&payments, group.id);
        let kind = if paid >= price {
            PaymentKind::BalanceCredit
        } else {
            PaymentKind::AttendanceCredit
        };

        let record = PaymentRecord::new(
            key.student_id,
            Some(group.id),
            kind,
            fee,
            session.date,
            PaymentSource::Attendance { key },
        )
        .with_notes(format!("session credit ({})", key.status));

        match self.store.insert_payment(record.clone())? {
            InsertOutcome::Inserted => {
                info!(
                    student = %key.student_id,
                    group = %group.id,
                    kind = ?kind,
                    amount = %fee,
                    "session credit recorded"
                );
                Ok(AdjustmentOutcome::Recorded(record))
            }
            InsertOutcome::Duplicate => {
                warn!(student = %key.student_id, key = %key, "session credit already recorded");
                Ok(AdjustmentOutcome::Duplicate(key))
            }
        }
    }

    fn failed(&self, key: &AdjustmentKey, reason: &str) -> AdjustmentOutcome {
        // attendance stays written; the adjustment is skipped
        warn!(
            student = %key.student_id,
            session = %key.session_id,
            status = %key.status,
            error = reason,
            "attendance adjustment failed"
        );
        AdjustmentOutcome::Failed {
            reason: reason.to_string(),
        }
    }
}

/// audit events for the outcome of one adjustment
pub(crate) fn emit_adjustment(
    events: &mut EventStore,
    session: &Session,
    key: &AdjustmentKey,
    outcome: &AdjustmentOutcome,
    timestamp: DateTime<Utc>,
) {
    match outcome {
        AdjustmentOutcome::Recorded(record) => {
            events.emit(Event::PaymentRecorded {
                student_id: record.student_id,
                payment_id: record.id,
                group_id: record.group_id,
                kind: record.kind,
                amount: record.amount,
                timestamp,
            });
            events.emit(Event::AdjustmentApplied {
                student_id: record.student_id,
                group_id: session.group_id,
                kind: record.kind,
                amount: record.amount,
                reason: key.status.to_string(),
                timestamp,
            });
        }
        AdjustmentOutcome::Duplicate(key) => events.emit(Event::AdjustmentSkipped {
            student_id: key.student_id,
            key: *key,
            timestamp,
        }),
        AdjustmentOutcome::Failed { reason } => events.emit(Event::AdjustmentFailed {
            student_id: key.student_id,
            session_id: session.id,
            reason: reason.clone(),
            timestamp,
        }),
        AdjustmentOutcome::NoChange => {}
    }
}

/// total of the adjustment records written for a student
pub fn adjustment_total(payments: &[PaymentRecord]) -> Money {
    payments
        .iter()
        .filter(|p| p.kind.is_adjustment())
        .map(|p| p.amount)
        .sum()
}
