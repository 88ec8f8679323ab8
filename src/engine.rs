use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use tracing::info;

use crate::billing::attendance::emit_adjustment;
use crate::billing::{
    AllocationEngine, AttendanceAdjuster, AttendanceOutcome, BalanceCalculator, BalanceSnapshot,
    CreditAllocationRequest, DepositReceipt, DepositRequest, LegacyPayment, StopAdjuster,
    StopAdjustment,
};
use crate::config::BillingConfig;
use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::events::{Event, EventStore};
use crate::model::PaymentRecord;
use crate::reports::{AccountSummary, BalanceView, ReportBuilder};
use crate::store::BillingStore;
use crate::types::{AdjustmentKey, AttendanceStatus, SessionId, StudentId};

/// one mutex per student, so writes for a student never interleave
#[derive(Debug, Default)]
pub struct StudentLocks {
    locks: Mutex<HashMap<StudentId, Arc<Mutex<()>>>>,
}

impl StudentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, student_id: StudentId) -> Arc<Mutex<()>> {
        // the registry only hands out handles, a poisoned map is still consistent
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(student_id).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// billing engine over a shared store
pub struct BillingEngine {
    store: Arc<dyn BillingStore>,
    config: BillingConfig,
    locks: StudentLocks,
    events: Mutex<EventStore>,
}

impl BillingEngine {
    pub fn new(store: Arc<dyn BillingStore>, config: BillingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            locks: StudentLocks::new(),
            events: Mutex::new(EventStore::new()),
        })
    }

    pub fn with_defaults(store: Arc<dyn BillingStore>) -> Self {
        Self {
            store,
            config: BillingConfig::default(),
            locks: StudentLocks::new(),
            events: Mutex::new(EventStore::new()),
        }
    }

    pub fn store(&self) -> &dyn BillingStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// current balance; takes no lock
    pub fn student_balance(&self, student_id: StudentId) -> Result<BalanceSnapshot> {
        BalanceCalculator::new(self.store(), &self.config).snapshot(student_id)
    }

    pub fn balance_view(&self, student_id: StudentId) -> Result<BalanceView> {
        let student = self.store.require_student(student_id)?;
        let snapshot = self.student_balance(student_id)?;
        Ok(BalanceView::from_snapshot(&student, &snapshot))
    }

    /// deposit with system time
    pub fn deposit_and_allocate_now(&self, request: DepositRequest) -> Result<DepositReceipt> {
        let time = SafeTimeProvider::new(hourglass_rs::TimeSource::System);
        self.deposit_and_allocate(request, &time)
    }

    pub fn deposit_and_allocate(
        &self,
        request: DepositRequest,
        time_provider: &SafeTimeProvider,
    ) -> Result<DepositReceipt> {
        let lock = self.locks.lock_for(request.student_id);
        let _guard = hold(&lock);

        let mut events = EventStore::new();
        let receipt = AllocationEngine::new(self.store(), &self.config).deposit_and_allocate(
            request,
            time_provider,
            &mut events,
        )?;
        self.publish(events)?;
        Ok(receipt)
    }

    /// convenience form of `deposit_and_allocate`
    pub fn deposit(
        &self,
        student_id: StudentId,
        amount: Money,
        date: NaiveDate,
        notes: Option<&str>,
        admin: Option<&str>,
        time_provider: &SafeTimeProvider,
    ) -> Result<DepositReceipt> {
        let request = DepositRequest {
            student_id,
            amount,
            date,
            notes: notes.map(str::to_string),
            admin: admin.map(str::to_string),
        };
        self.deposit_and_allocate(request, time_provider)
    }

    pub fn allocate_from_existing_credit(
        &self,
        request: CreditAllocationRequest,
        time_provider: &SafeTimeProvider,
    ) -> Result<Vec<PaymentRecord>> {
        let lock = self.locks.lock_for(request.student_id);
        let _guard = hold(&lock);

        let mut events = EventStore::new();
        let records = AllocationEngine::new(self.store(), &self.config).allocate_from_existing_credit(
            request,
            time_provider,
            &mut events,
        )?;
        self.publish(events)?;
        Ok(records)
    }

    pub fn record_attendance(
        &self,
        session_id: SessionId,
        student_id: StudentId,
        status: AttendanceStatus,
        time_provider: &SafeTimeProvider,
    ) -> Result<AttendanceOutcome> {
        let lock = self.locks.lock_for(student_id);
        let _guard = hold(&lock);

        let mut events = EventStore::new();
        let result = AttendanceAdjuster::new(self.store(), &self.config).process(
            session_id,
            student_id,
            status,
            time_provider,
            &mut events,
        );
        // a failed enrollment upsert still leaves the attendance written
        self.publish(events)?;
        result
    }

    /// attendance with a status as typed by the user
    pub fn record_attendance_str(
        &self,
        session_id: SessionId,
        student_id: StudentId,
        status: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<AttendanceOutcome> {
        let status: AttendanceStatus = status.parse()?;
        self.record_attendance(session_id, student_id, status, time_provider)
    }

    /// stop adjustment computed from the student's current attendance at the session
    pub fn process_stop_adjustment(
        &self,
        session_id: SessionId,
        student_id: StudentId,
        time_provider: &SafeTimeProvider,
    ) -> Result<StopAdjustment> {
        let lock = self.locks.lock_for(student_id);
        let _guard = hold(&lock);

        let session = self.store.require_session(session_id)?;
        self.store.require_student(student_id)?;
        let version = self
            .store
            .attendance(session_id, student_id)?
            .filter(|a| a.status == AttendanceStatus::Stop)
            .map(|a| a.version)
            .unwrap_or(0);
        let key = AdjustmentKey {
            session_id,
            student_id,
            status: AttendanceStatus::Stop,
            version,
        };

        let adjustment = StopAdjuster::new(self.store(), &self.config).process(&session, student_id, key)?;

        let mut events = EventStore::new();
        emit_adjustment(&mut events, &session, &key, &adjustment.outcome, time_provider.now());
        self.publish(events)?;
        Ok(adjustment)
    }

    pub fn refund_list(&self) -> Result<Vec<AccountSummary>> {
        ReportBuilder::new(self.store(), &self.config).refund_list()
    }

    pub fn debts_list(&self) -> Result<Vec<AccountSummary>> {
        ReportBuilder::new(self.store(), &self.config).debts_list()
    }

    /// migration shim for rows that predate explicit payment kinds
    pub fn import_legacy_payment(
        &self,
        payment: LegacyPayment,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentRecord> {
        let lock = self.locks.lock_for(payment.student_id);
        let _guard = hold(&lock);

        if !payment.amount.is_positive() {
            return Err(BillingError::NonPositivePayment {
                amount: payment.amount,
            });
        }
        self.store.require_student(payment.student_id)?;
        if let Some(group_id) = payment.group_id {
            self.store.require_group(group_id)?;
        }

        let record = payment.into_record(&self.config.legacy_markers);
        self.store.insert_payment(record.clone())?;

        info!(
            student = %record.student_id,
            kind = ?record.kind,
            amount = %record.amount,
            system = record.system_generated,
            "legacy payment imported"
        );

        let mut events = EventStore::new();
        events.emit(Event::PaymentRecorded {
            student_id: record.student_id,
            payment_id: record.id,
            group_id: record.group_id,
            kind: record.kind,
            amount: record.amount,
            timestamp: time_provider.now(),
        });
        self.publish(events)?;
        Ok(record)
    }

    /// events emitted so far
    pub fn events(&self) -> Result<Vec<Event>> {
        Ok(self.shared_events()?.events().to_vec())
    }

    /// get events
    pub fn take_events(&self) -> Result<Vec<Event>> {
        Ok(self.shared_events()?.take_events())
    }

    fn shared_events(&self) -> Result<MutexGuard<'_, EventStore>> {
        self.events
            .lock()
            .map_err(|_| BillingError::store("event log lock poisoned"))
    }

    fn publish(&self, mut events: EventStore) -> Result<()> {
        if !events.is_empty() {
            self.shared_events()?.extend(events.take_events());
        }
        Ok(())
    }
}
