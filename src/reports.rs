//! Account reports and serializable balance views.
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::billing::attendance::adjustment_total;
use crate::billing::{BalanceCalculator, BalanceSnapshot, ObligationLine, ObligationTarget};
use crate::config::BillingConfig;
use crate::decimal::{Money, Percent};
use crate::errors::Result;
use crate::model::Student;
use crate::store::{BillingStore, ResolutionStrategy};
use crate::types::{BalanceMode, GroupId, StudentId};

/// per-group figures of a stopped account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_id: GroupId,
    pub name: Option<String>,
    pub obligatory_sessions: u32,
    pub free_sessions: u32,
    pub actual_fee: Money,
    pub paid: Money,
    /// attendance and balance credits written for the group
    pub adjustments: Money,
}

/// one stopped student's position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub student_id: StudentId,
    pub name: String,
    /// money paid minus what the attended sessions and registration cost
    pub net_balance: Money,
    /// balance as the stopped-student calculator reports it
    pub reported_balance: Money,
    pub groups: Vec<GroupSummary>,
}

impl AccountSummary {
    pub fn is_refund(&self) -> bool {
        self.net_balance.is_positive()
    }

    pub fn is_debt(&self) -> bool {
        self.net_balance.is_negative()
    }
}

/// builds refund and debt lists over every stopped student
pub struct ReportBuilder<'a> {
    store: &'a dyn BillingStore,
    config: &'a BillingConfig,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(store: &'a dyn BillingStore, config: &'a BillingConfig) -> Self {
        Self { store, config }
    }

    /// stopped students who paid more than they owe
    pub fn refund_list(&self) -> Result<Vec<AccountSummary>> {
        Ok(self
            .stopped_accounts()?
            .into_iter()
            .filter(AccountSummary::is_refund)
            .collect())
    }

    /// stopped students who still owe money
    pub fn debts_list(&self) -> Result<Vec<AccountSummary>> {
        Ok(self
            .stopped_accounts()?
            .into_iter()
            .filter(AccountSummary::is_debt)
            .collect())
    }

    /// summary of one student, `None` unless the student is billed as stopped
    pub fn account_summary(&self, student: &Student) -> Result<Option<AccountSummary>> {
        let snapshot = BalanceCalculator::new(self.store, self.config).snapshot(student.id)?;
        if snapshot.mode != BalanceMode::StoppedStudent {
            return Ok(None);
        }

        let payments = self.store.payments_for_student(student.id)?;
        let owed: Money = snapshot.lines.iter().map(|l| l.obligation).sum();

        let groups = snapshot
            .lines
            .iter()
            .filter_map(|line| {
                let group_id = line.target.group_id()?;
                let sessions = line.sessions?;
                let group_payments: Vec<_> = payments
                    .iter()
                    .filter(|p| p.is_for_group(group_id))
                    .cloned()
                    .collect();
                Some(GroupSummary {
                    group_id,
                    name: line.group_name.clone(),
                    obligatory_sessions: sessions.obligatory_sessions,
                    free_sessions: sessions.free_sessions,
                    actual_fee: sessions.actual_fee,
                    paid: line.paid,
                    adjustments: adjustment_total(&group_payments),
                })
            })
            .collect();

        Ok(Some(AccountSummary {
            student_id: student.id,
            name: student.name.clone(),
            net_balance: snapshot.total_paid - owed,
            reported_balance: snapshot.remaining_balance,
            groups,
        }))
    }

    fn stopped_accounts(&self) -> Result<Vec<AccountSummary>> {
        let mut accounts = Vec::new();
        for student in self.store.students()? {
            match self.account_summary(&student) {
                Ok(Some(account)) => accounts.push(account),
                Ok(None) => {}
                // one broken account does not hide the others
                Err(e) => warn!(student = %student.id, error = %e, "account skipped from report"),
            }
        }
        debug!(accounts = accounts.len(), "stopped accounts collected");
        Ok(accounts)
    }
}

/// serializable view of a balance snapshot
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceView {
    pub student_id: StudentId,
    pub name: String,
    pub mode: BalanceMode,
    pub strategy: ResolutionStrategy,
    pub totals: TotalsView,
    pub lines: Vec<LineView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TotalsView {
    pub total_obligation: Money,
    pub total_paid: Money,
    pub credit: Money,
    pub unpaid: Money,
    pub remaining_balance: Money,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LineView {
    pub label: String,
    pub group_id: Option<GroupId>,
    pub obligation: Money,
    pub paid: Money,
    pub remaining: Money,
    pub discount: Percent,
    pub obligatory_sessions: Option<u32>,
    pub free_sessions: Option<u32>,
}

impl LineView {
    fn from_line(line: &ObligationLine) -> Self {
        let label = match line.target {
            ObligationTarget::Registration => "registration".to_string(),
            ObligationTarget::Group(id) => line.group_name.clone().unwrap_or_else(|| id.to_string()),
        };
        LineView {
            label,
            group_id: line.target.group_id(),
            obligation: line.obligation,
            paid: line.paid,
            remaining: line.remaining,
            discount: line.discount,
            obligatory_sessions: line.sessions.map(|s| s.obligatory_sessions),
            free_sessions: line.sessions.map(|s| s.free_sessions),
        }
    }
}

impl BalanceView {
    pub fn from_snapshot(student: &Student, snapshot: &BalanceSnapshot) -> Self {
        BalanceView {
            student_id: snapshot.student_id,
            name: student.name.clone(),
            mode: snapshot.mode,
            strategy: snapshot.strategy,
            totals: TotalsView {
                total_obligation: snapshot.total_obligation,
                total_paid: snapshot.total_paid,
                credit: snapshot.credit,
                unpaid: snapshot.unpaid,
                remaining_balance: snapshot.remaining_balance,
            },
            lines: snapshot.lines.iter().map(LineView::from_line).collect(),
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// short alias for json output
    pub fn json(&self) -> String {
        self.to_json_pretty()
            .unwrap_or_else(|e| format!("JSON error: {}", e))
    }
}
