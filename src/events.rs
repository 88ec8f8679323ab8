use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    AdjustmentKey, AttendanceStatus, DepositId, EnrollmentStatus, GroupId, PaymentId, PaymentKind,
    SessionId, StudentId,
};

/// all events that can be emitted by the billing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // money events
    DepositReceived {
        student_id: StudentId,
        deposit_id: DepositId,
        amount: Money,
        timestamp: DateTime<Utc>,
    },
    CreditAllocated {
        student_id: StudentId,
        amount: Money,
        timestamp: DateTime<Utc>,
    },
    PaymentRecorded {
        student_id: StudentId,
        payment_id: PaymentId,
        group_id: Option<GroupId>,
        kind: PaymentKind,
        amount: Money,
        timestamp: DateTime<Utc>,
    },

    // attendance events
    AttendanceRecorded {
        student_id: StudentId,
        session_id: SessionId,
        status: AttendanceStatus,
        version: u64,
        timestamp: DateTime<Utc>,
    },
    EnrollmentStatusChanged {
        student_id: StudentId,
        group_id: GroupId,
        old_status: Option<EnrollmentStatus>,
        new_status: EnrollmentStatus,
        timestamp: DateTime<Utc>,
    },

    // adjustment events
    AdjustmentApplied {
        student_id: StudentId,
        group_id: GroupId,
        kind: PaymentKind,
        amount: Money,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    AdjustmentSkipped {
        student_id: StudentId,
        key: AdjustmentKey,
        timestamp: DateTime<Utc>,
    },
    AdjustmentFailed {
        student_id: StudentId,
        session_id: SessionId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
