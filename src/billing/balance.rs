//! Balance calculator for students with at least one live enrollment.
//!
//! Obligations come from the course price, the student's discount and the
//! registration fee. Unassigned deposits are netted against whatever is still
//! unpaid, so a positive remaining balance is spare credit.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::BillingConfig;
use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::model::{Group, PaymentRecord, Student};
use crate::store::{BillingStore, ResolvedEnrollments};
use crate::types::{BalanceMode, GroupId, PaymentKind, PaymentSource};

use super::obligation::{group_obligation, registration_obligation};
use super::{BalanceSnapshot, ObligationLine, ObligationTarget};

/// registration payments, ignoring placeholder rows
pub fn registration_paid(payments: &[PaymentRecord]) -> Money {
    payments
        .iter()
        .filter(|p| p.is_unassigned())
        .filter(|p| p.kind == PaymentKind::RegistrationFee && !p.system_generated)
        .map(|p| p.amount)
        .sum()
}

/// everything tagged to a group, ignoring rows without notes and placeholder rows
///
/// balance credits tagged to the group count here too, so on an already paid
/// group they are absorbed by the clamp on `remaining`. the refundable amount
/// surfaces once the student stops, through the stopped-student money totals
/// and the refund list.
pub fn group_paid(payments: &[PaymentRecord], group_id: GroupId) -> Money {
    payments
        .iter()
        .filter(|p| p.is_for_group(group_id))
        .filter(|p| p.has_notes() && !p.system_generated)
        .map(|p| p.amount)
        .sum()
}

/// unassigned deposits minus what was already spent from them
pub fn unallocated_credit(payments: &[PaymentRecord]) -> Money {
    let deposited: Money = payments
        .iter()
        .filter(|p| p.is_unassigned() && p.kind.is_pure_deposit())
        .filter(|p| p.source != PaymentSource::ExistingCredit)
        .map(|p| p.amount)
        .sum();

    let spent: Money = payments
        .iter()
        .filter(|p| p.source == PaymentSource::ExistingCredit)
        .map(|p| p.amount)
        .sum();

    deposited - spent
}

/// fails when a payment is tagged to a group that no longer exists
pub(crate) fn check_payment_groups(store: &dyn BillingStore, payments: &[PaymentRecord]) -> Result<()> {
    let groups: BTreeSet<GroupId> = payments.iter().filter_map(|p| p.group_id).collect();
    for group_id in groups {
        if store.group(group_id)?.is_none() {
            // report the first offending record
            let payment_id = payments
                .iter()
                .find(|p| p.group_id == Some(group_id))
                .map(|p| p.id)
                .unwrap_or_default();
            return Err(BillingError::PaymentForUnknownGroup {
                payment_id,
                group_id,
            });
        }
    }
    Ok(())
}

/// active-student calculator
pub struct ActiveStudentCalculator<'a> {
    store: &'a dyn BillingStore,
    config: &'a BillingConfig,
}

impl<'a> ActiveStudentCalculator<'a> {
    pub fn new(store: &'a dyn BillingStore, config: &'a BillingConfig) -> Self {
        Self { store, config }
    }

    pub fn calculate(&self, student: &Student, resolved: &ResolvedEnrollments) -> Result<BalanceSnapshot> {
        let payments = self.store.payments_for_student(student.id)?;
        check_payment_groups(self.store, &payments)?;

        let discount = student.default_discount;
        let mut lines = Vec::with_capacity(resolved.enrollments.len() + 1);

        lines.push(ObligationLine::new(
            ObligationTarget::Registration,
            registration_obligation(self.config, discount),
            registration_paid(&payments),
            discount,
        ));

        for group in self.enrolled_groups(student, resolved)? {
            let mut line = ObligationLine::new(
                ObligationTarget::Group(group.id),
                group_obligation(&group, discount)?,
                group_paid(&payments, group.id),
                discount,
            );
            line.group_name = Some(group.name.clone());
            line.start_date = Some(group.start_date);
            lines.push(line);
        }

        let total_obligation: Money = lines.iter().map(|l| l.obligation).sum();
        let total_paid: Money = lines.iter().map(|l| l.paid).sum();
        let unpaid: Money = lines.iter().map(|l| l.remaining).sum();
        let credit = unallocated_credit(&payments);
        let remaining_balance = credit - unpaid;

        debug!(
            student = %student.id,
            obligation = %total_obligation,
            paid = %total_paid,
            credit = %credit,
            balance = %remaining_balance,
            "active-student balance"
        );

        Ok(BalanceSnapshot {
            student_id: student.id,
            mode: BalanceMode::ActiveStudent,
            strategy: resolved.strategy,
            total_obligation,
            total_paid,
            credit,
            unpaid,
            remaining_balance,
            lines,
        })
    }

    /// groups ordered oldest first, which is also the payment priority
    fn enrolled_groups(&self, student: &Student, resolved: &ResolvedEnrollments) -> Result<Vec<Group>> {
        let mut groups = Vec::with_capacity(resolved.enrollments.len());
        for enrollment in &resolved.enrollments {
            let group = self
                .store
                .group(enrollment.group_id)?
                .ok_or(BillingError::EnrollmentWithoutGroup {
                    student_id: student.id,
                    group_id: enrollment.group_id,
                })?;
            groups.push(group);
        }
        groups.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id)));
        Ok(groups)
    }
}
