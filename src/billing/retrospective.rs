//! Attendance-based billing for students who left their groups.
//!
//! A stopped student owes only for obligatory sessions. The same session
//! classification drives the one-off adjustment written when a student stops.

use tracing::{debug, info, warn};

use crate::config::BillingConfig;
use crate::decimal::{Money, Percent};
use crate::errors::{BillingError, Result};
use crate::model::{Group, PaymentRecord, Session, Student};
use crate::store::{BillingStore, InsertOutcome, ResolvedEnrollments};
use crate::types::{
    category_of, AdjustmentKey, AttendanceCategory, BalanceMode, GroupId, PaymentKind,
    PaymentSource, SessionId, StudentId,
};

use super::balance::check_payment_groups;
use super::obligation::session_fee_with_fallback;
use super::{AdjustmentOutcome, BalanceSnapshot, ObligationLine, ObligationTarget, SessionBreakdown};

const STOP_NOTE: &str = "stop adjustment";

/// obligatory and free session counts of one student over a group's whole history
pub fn classify_sessions(
    store: &dyn BillingStore,
    group_id: GroupId,
    student_id: StudentId,
) -> Result<(u32, u32)> {
    let mut obligatory = 0;
    let mut free = 0;
    for session in store.sessions_for_group(group_id)? {
        let status = store.attendance(session.id, student_id)?.map(|a| a.status);
        match category_of(status) {
            AttendanceCategory::Obligatory => obligatory += 1,
            AttendanceCategory::Free => free += 1,
        }
    }
    Ok((obligatory, free))
}

/// real money tagged to a group
pub fn group_money_paid(payments: &[PaymentRecord], group_id: GroupId) -> Money {
    payments
        .iter()
        .filter(|p| p.is_for_group(group_id) && p.kind.is_money())
        .map(|p| p.amount)
        .sum()
}

/// every group-null payment, whatever its kind
pub fn unassigned_paid(payments: &[PaymentRecord]) -> Money {
    payments
        .iter()
        .filter(|p| p.is_unassigned())
        .map(|p| p.amount)
        .sum()
}

fn breakdown_for(
    store: &dyn BillingStore,
    config: &BillingConfig,
    group: &Group,
    student_id: StudentId,
) -> Result<SessionBreakdown> {
    let fee = session_fee_with_fallback(group, config)?;
    let (obligatory, free) = classify_sessions(store, group.id, student_id)?;
    Ok(SessionBreakdown::new(obligatory, free, fee))
}

/// stopped-student calculator
pub struct StoppedStudentCalculator<'a> {
    store: &'a dyn BillingStore,
    config: &'a BillingConfig,
}

impl<'a> StoppedStudentCalculator<'a> {
    pub fn new(store: &'a dyn BillingStore, config: &'a BillingConfig) -> Self {
        Self { store, config }
    }

    pub fn calculate(&self, student: &Student, resolved: &ResolvedEnrollments) -> Result<BalanceSnapshot> {
        let payments = self.store.payments_for_student(student.id)?;
        check_payment_groups(self.store, &payments)?;

        // base fee, undiscounted, against everything not tagged to a group
        let registration = ObligationLine::new(
            ObligationTarget::Registration,
            self.config.registration_fee,
            unassigned_paid(&payments),
            Percent::ZERO,
        );
        let mut total_obligation = registration.remaining;
        let mut lines = vec![registration];

        let group_ids = resolved.retrospective_group_ids();
        let mut groups = Vec::with_capacity(group_ids.len());
        for group_id in group_ids {
            let group = self
                .store
                .group(group_id)?
                .ok_or(BillingError::EnrollmentWithoutGroup {
                    student_id: student.id,
                    group_id,
                })?;
            groups.push(group);
        }
        groups.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id)));

        let mut actual_fees = Money::ZERO;
        for group in groups {
            let breakdown = breakdown_for(self.store, self.config, &group, student.id)?;
            let mut line = ObligationLine::new(
                ObligationTarget::Group(group.id),
                breakdown.actual_fee,
                group_money_paid(&payments, group.id),
                Percent::ZERO,
            );
            line.group_name = Some(group.name);
            line.start_date = Some(group.start_date);
            line.sessions = Some(breakdown);

            total_obligation += breakdown.actual_fee;
            actual_fees += breakdown.actual_fee;
            lines.push(line);
        }

        let total_paid: Money = lines.iter().map(|l| l.paid).sum();
        let unpaid: Money = lines.iter().map(|l| l.remaining).sum();
        // reported as a debt magnitude, never netted against payments
        let remaining_balance = -actual_fees;

        debug!(
            student = %student.id,
            obligation = %total_obligation,
            paid = %total_paid,
            balance = %remaining_balance,
            "stopped-student balance"
        );

        Ok(BalanceSnapshot {
            student_id: student.id,
            mode: BalanceMode::StoppedStudent,
            strategy: resolved.strategy,
            total_obligation,
            total_paid,
            credit: Money::ZERO,
            unpaid,
            remaining_balance,
            lines,
        })
    }
}

/// figures behind the adjustment written when a student stops
#[derive(Debug, Clone, PartialEq)]
pub struct StopAdjustment {
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub group_id: GroupId,
    /// date of the stopped session, also the record date
    pub date: chrono::NaiveDate,
    pub breakdown: SessionBreakdown,
    /// money paid for the group
    pub total_paid: Money,
    pub outcome: AdjustmentOutcome,
}

impl StopAdjustment {
    /// kind and amount the figures call for, if any
    pub fn planned(&self) -> Option<(PaymentKind, Money)> {
        plan_stop(&self.breakdown, self.total_paid)
    }
}

/// balance credit for an overpayment, otherwise attendance credit for free sessions
pub fn plan_stop(breakdown: &SessionBreakdown, total_paid: Money) -> Option<(PaymentKind, Money)> {
    let (kind, amount) = if total_paid > breakdown.actual_fee {
        (PaymentKind::BalanceCredit, total_paid - breakdown.actual_fee)
    } else {
        // a shortfall is left for the stopped-student balance to report
        (PaymentKind::AttendanceCredit, breakdown.free_amount)
    };
    amount.is_positive().then_some((kind, amount))
}

/// computes and records the stop adjustment of one student
pub struct StopAdjuster<'a> {
    store: &'a dyn BillingStore,
    config: &'a BillingConfig,
}

impl<'a> StopAdjuster<'a> {
    pub fn new(store: &'a dyn BillingStore, config: &'a BillingConfig) -> Self {
        Self { store, config }
    }

    /// figures only, nothing is written
    pub fn assess(&self, session: &Session, student_id: StudentId) -> Result<StopAdjustment> {
        let group = self.store.require_group(session.group_id)?;
        let breakdown = breakdown_for(self.store, self.config, &group, student_id)?;
        let payments = self.store.payments_for_student(student_id)?;

        Ok(StopAdjustment {
            session_id: session.id,
            student_id,
            group_id: group.id,
            date: session.date,
            breakdown,
            total_paid: group_money_paid(&payments, group.id),
            outcome: AdjustmentOutcome::NoChange,
        })
    }

    pub fn process(&self, session: &Session, student_id: StudentId, key: AdjustmentKey) -> Result<StopAdjustment> {
        let mut adjustment = self.assess(session, student_id)?;

        let Some((kind, amount)) = adjustment.planned() else {
            debug!(student = %student_id, session = %session.id, "stop adjustment is zero");
            return Ok(adjustment);
        };

        let record = PaymentRecord::new(
            student_id,
            Some(adjustment.group_id),
            kind,
            amount,
            adjustment.date,
            PaymentSource::StopAdjustment { key },
        )
        .with_notes(STOP_NOTE);

        adjustment.outcome = match self.store.insert_payment(record.clone())? {
            InsertOutcome::Inserted => {
                info!(
                    student = %student_id,
                    group = %adjustment.group_id,
                    kind = ?kind,
                    amount = %amount,
                    "stop adjustment recorded"
                );
                AdjustmentOutcome::Recorded(record)
            }
            InsertOutcome::Duplicate => {
                warn!(student = %student_id, key = %key, "stop adjustment already recorded");
                AdjustmentOutcome::Duplicate(key)
            }
        };
        Ok(adjustment)
    }
}
