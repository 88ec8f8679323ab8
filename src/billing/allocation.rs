use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::decimal::{Money, Percent};
use crate::errors::{BillingError, Result};
use crate::events::{Event, EventStore};
use crate::model::PaymentRecord;
use crate::store::BillingStore;
use crate::types::{DepositId, PaymentKind, PaymentSource, StudentId};

use super::{BalanceCalculator, BalanceSnapshot, ObligationTarget};

const DEPOSIT_NOTE: &str = "deposit allocation";
const LEFTOVER_NOTE: &str = "balance addition";
const CREDIT_NOTE: &str = "allocated from credit";

/// new money handed over by a student
#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub student_id: StudentId,
    pub amount: Money,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub admin: Option<String>,
}

impl DepositRequest {
    pub fn new(student_id: StudentId, amount: Money, date: NaiveDate) -> Self {
        Self {
            student_id,
            amount,
            date,
            notes: None,
            admin: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_admin(mut self, admin: impl Into<String>) -> Self {
        self.admin = Some(admin.into());
        self
    }
}

/// spend credit the student already holds
#[derive(Debug, Clone)]
pub struct CreditAllocationRequest {
    pub student_id: StudentId,
    /// defaults to today
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub admin: Option<String>,
}

impl CreditAllocationRequest {
    pub fn new(student_id: StudentId) -> Self {
        Self {
            student_id,
            date: None,
            notes: None,
            admin: None,
        }
    }
}

/// one planned payment against an obligation line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAllocation {
    pub target: ObligationTarget,
    pub kind: PaymentKind,
    pub amount: Money,
    pub discount: Percent,
}

/// how an amount would be spread over a snapshot's obligations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub allocations: Vec<PlannedAllocation>,
    pub leftover: Money,
}

impl AllocationPlan {
    pub fn allocated(&self) -> Money {
        self.allocations.iter().map(|a| a.amount).sum()
    }
}

/// records written for one deposit
#[derive(Debug, Clone, PartialEq)]
pub struct DepositReceipt {
    pub deposit_id: DepositId,
    pub student_id: StudentId,
    pub amount: Money,
    /// obligation payments in priority order, then the leftover record if any
    pub allocations: Vec<PaymentRecord>,
}

impl DepositReceipt {
    pub fn leftover(&self) -> Money {
        self.allocations
            .iter()
            .filter(|r| r.kind == PaymentKind::BalanceAddition)
            .map(|r| r.amount)
            .sum()
    }
}

fn note(label: &str, notes: Option<&str>) -> String {
    match notes.map(str::trim).filter(|n| !n.is_empty()) {
        Some(notes) => format!("{label}: {notes}"),
        None => label.to_string(),
    }
}

/// spreads money over a student's obligations, registration first then groups by start date
pub struct AllocationEngine<'a> {
    store: &'a dyn BillingStore,
    config: &'a BillingConfig,
}

impl<'a> AllocationEngine<'a> {
    pub fn new(store: &'a dyn BillingStore, config: &'a BillingConfig) -> Self {
        Self { store, config }
    }

    /// walk the snapshot's lines in order, paying each remaining amount
    pub fn plan(snapshot: &BalanceSnapshot, available: Money) -> AllocationPlan {
        let mut left = available.non_negative();
        let mut allocations = Vec::new();

        for line in &snapshot.lines {
            if left.is_zero() {
                break;
            }
            if !line.remaining.is_positive() {
                continue;
            }

            let amount = line.remaining.min(left);
            let kind = match line.target {
                ObligationTarget::Registration => PaymentKind::RegistrationFee,
                ObligationTarget::Group(_) => PaymentKind::GroupPayment,
            };
            allocations.push(PlannedAllocation {
                target: line.target,
                kind,
                amount,
                discount: line.discount,
            });
            left -= amount;
        }

        AllocationPlan {
            allocations,
            leftover: left,
        }
    }

    pub fn deposit_and_allocate(
        &self,
        request: DepositRequest,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<DepositReceipt> {
        if !request.amount.is_positive() {
            return Err(BillingError::InvalidDepositAmount {
                amount: request.amount,
            });
        }

        let snapshot = BalanceCalculator::new(self.store, self.config).snapshot(request.student_id)?;
        let plan = Self::plan(&snapshot, request.amount);
        let deposit_id = Uuid::new_v4();
        let source = PaymentSource::Deposit { deposit_id };
        let notes = note(DEPOSIT_NOTE, request.notes.as_deref());

        let mut records: Vec<PaymentRecord> = plan
            .allocations
            .iter()
            .map(|allocation| {
                PaymentRecord::new(
                    request.student_id,
                    allocation.target.group_id(),
                    allocation.kind,
                    allocation.amount,
                    request.date,
                    source,
                )
                .with_discount(allocation.discount)
                .with_notes(notes.clone())
                .with_admin(request.admin.clone())
            })
            .collect();

        if plan.leftover.is_positive() {
            records.push(
                PaymentRecord::new(
                    request.student_id,
                    None,
                    PaymentKind::BalanceAddition,
                    plan.leftover,
                    request.date,
                    source,
                )
                .with_notes(note(LEFTOVER_NOTE, request.notes.as_deref()))
                .with_admin(request.admin.clone()),
            );
        }

        let timestamp = time_provider.now();
        events.emit(Event::DepositReceived {
            student_id: request.student_id,
            deposit_id,
            amount: request.amount,
            timestamp,
        });
        self.write_all(&records, timestamp, events)?;

        info!(
            student = %request.student_id,
            deposit = %deposit_id,
            amount = %request.amount,
            records = records.len(),
            leftover = %plan.leftover,
            "deposit allocated"
        );

        Ok(DepositReceipt {
            deposit_id,
            student_id: request.student_id,
            amount: request.amount,
            allocations: records,
        })
    }

    /// never spends more than the snapshot's positive balance and writes no leftover
    pub fn allocate_from_existing_credit(
        &self,
        request: CreditAllocationRequest,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<Vec<PaymentRecord>> {
        let snapshot = BalanceCalculator::new(self.store, self.config).snapshot(request.student_id)?;
        let available = snapshot.available_credit();
        if available.is_zero() {
            debug!(student = %request.student_id, "no credit to allocate");
            return Ok(Vec::new());
        }

        let plan = Self::plan(&snapshot, available);
        let timestamp = time_provider.now();
        let date = request.date.unwrap_or_else(|| timestamp.date_naive());
        let notes = note(CREDIT_NOTE, request.notes.as_deref());

        let records: Vec<PaymentRecord> = plan
            .allocations
            .iter()
            .map(|allocation| {
                PaymentRecord::new(
                    request.student_id,
                    allocation.target.group_id(),
                    allocation.kind,
                    allocation.amount,
                    date,
                    PaymentSource::ExistingCredit,
                )
                .with_discount(allocation.discount)
                .with_notes(notes.clone())
                .with_admin(request.admin.clone())
            })
            .collect();

        if records.is_empty() {
            debug!(student = %request.student_id, credit = %available, "nothing left to pay");
            return Ok(records);
        }

        self.write_all(&records, timestamp, events)?;
        events.emit(Event::CreditAllocated {
            student_id: request.student_id,
            amount: plan.allocated(),
            timestamp,
        });

        info!(
            student = %request.student_id,
            amount = %plan.allocated(),
            credit = %available,
            "credit allocated"
        );
        Ok(records)
    }

    fn write_all(
        &self,
        records: &[PaymentRecord],
        timestamp: chrono::DateTime<chrono::Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        for record in records {
            self.store.insert_payment(record.clone())?;
            events.emit(Event::PaymentRecorded {
                student_id: record.student_id,
                payment_id: record.id,
                group_id: record.group_id,
                kind: record.kind,
                amount: record.amount,
                timestamp,
            });
        }
        Ok(())
    }
}
