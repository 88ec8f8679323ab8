pub mod allocation;
pub mod attendance;
pub mod balance;
pub mod legacy;
pub mod obligation;
pub mod retrospective;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::BillingConfig;
use crate::decimal::{Money, Percent};
use crate::errors::Result;
use crate::model::PaymentRecord;
use crate::store::{BillingStore, EnrollmentSource, ResolutionStrategy};
use crate::types::{AdjustmentKey, BalanceMode, GroupId, StudentId};

pub use allocation::{
    AllocationEngine, AllocationPlan, CreditAllocationRequest, DepositReceipt, DepositRequest,
    PlannedAllocation,
};
pub use attendance::{AttendanceAdjuster, AttendanceOutcome};
pub use balance::ActiveStudentCalculator;
pub use legacy::{LegacyClassification, LegacyPayment};
pub use retrospective::{StopAdjuster, StopAdjustment, StoppedStudentCalculator};

/// what an obligation line is owed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObligationTarget {
    Registration,
    Group(GroupId),
}

impl ObligationTarget {
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            ObligationTarget::Registration => None,
            ObligationTarget::Group(id) => Some(*id),
        }
    }
}

/// attendance-derived fee of one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBreakdown {
    pub obligatory_sessions: u32,
    pub free_sessions: u32,
    pub price_per_session: Money,
    /// obligatory sessions times the session price
    pub actual_fee: Money,
    /// free sessions times the session price
    pub free_amount: Money,
}

impl SessionBreakdown {
    pub fn new(obligatory_sessions: u32, free_sessions: u32, price_per_session: Money) -> Self {
        Self {
            obligatory_sessions,
            free_sessions,
            price_per_session,
            actual_fee: price_per_session.times(obligatory_sessions),
            free_amount: price_per_session.times(free_sessions),
        }
    }
}

/// one obligation of a balance snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObligationLine {
    pub target: ObligationTarget,
    pub group_name: Option<String>,
    /// group start date, the payment priority among groups
    pub start_date: Option<NaiveDate>,
    pub obligation: Money,
    pub paid: Money,
    pub remaining: Money,
    /// discount already folded into `obligation`
    pub discount: Percent,
    /// present for stopped-student lines
    pub sessions: Option<SessionBreakdown>,
}

impl ObligationLine {
    pub fn new(target: ObligationTarget, obligation: Money, paid: Money, discount: Percent) -> Self {
        Self {
            target,
            group_name: None,
            start_date: None,
            obligation,
            paid,
            remaining: (obligation - paid).non_negative(),
            discount,
            sessions: None,
        }
    }
}

/// point-in-time balance of one student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub student_id: StudentId,
    pub mode: BalanceMode,
    pub strategy: ResolutionStrategy,
    pub total_obligation: Money,
    pub total_paid: Money,
    /// unassigned deposits not yet spent
    pub credit: Money,
    /// sum of the remaining amounts of every line
    pub unpaid: Money,
    /// positive means spare credit, negative means money owed
    pub remaining_balance: Money,
    /// registration first, then groups by start date
    pub lines: Vec<ObligationLine>,
}

impl BalanceSnapshot {
    pub fn registration(&self) -> Option<&ObligationLine> {
        self.lines
            .iter()
            .find(|l| l.target == ObligationTarget::Registration)
    }

    pub fn group_line(&self, group_id: GroupId) -> Option<&ObligationLine> {
        self.lines
            .iter()
            .find(|l| l.target == ObligationTarget::Group(group_id))
    }

    /// credit that can still be spent on obligations
    pub fn available_credit(&self) -> Money {
        self.remaining_balance.non_negative()
    }

    pub fn is_settled(&self) -> bool {
        self.unpaid.is_zero()
    }
}

/// outcome of one attendance-driven financial adjustment
#[derive(Debug, Clone, PartialEq)]
pub enum AdjustmentOutcome {
    Recorded(PaymentRecord),
    /// the status carries no financial change, or the computed amount was zero
    NoChange,
    /// a record with this key was already written
    Duplicate(AdjustmentKey),
    /// the adjustment failed and was skipped; attendance is kept
    Failed { reason: String },
}

impl AdjustmentOutcome {
    pub fn record(&self) -> Option<&PaymentRecord> {
        match self {
            AdjustmentOutcome::Recorded(record) => Some(record),
            _ => None,
        }
    }
}

/// picks the calculator variant for a student and runs it
pub struct BalanceCalculator<'a> {
    store: &'a dyn BillingStore,
    config: &'a BillingConfig,
}

impl<'a> BalanceCalculator<'a> {
    pub fn new(store: &'a dyn BillingStore, config: &'a BillingConfig) -> Self {
        Self { store, config }
    }

    pub fn snapshot(&self, student_id: StudentId) -> Result<BalanceSnapshot> {
        let student = self.store.require_student(student_id)?;
        let resolved = EnrollmentSource::new(self.store).resolve(&student)?;

        match resolved.mode() {
            BalanceMode::ActiveStudent => {
                ActiveStudentCalculator::new(self.store, self.config).calculate(&student, &resolved)
            }
            BalanceMode::StoppedStudent => {
                StoppedStudentCalculator::new(self.store, self.config).calculate(&student, &resolved)
            }
        }
    }
}
