pub mod billing;
pub mod config;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod model;
pub mod reports;
pub mod store;
pub mod types;

// re-export key types
pub use billing::{
    ActiveStudentCalculator, AdjustmentOutcome, AllocationEngine, AllocationPlan,
    AttendanceAdjuster, AttendanceOutcome, BalanceCalculator, BalanceSnapshot,
    CreditAllocationRequest, DepositReceipt, DepositRequest, LegacyClassification, LegacyPayment,
    ObligationLine, ObligationTarget, SessionBreakdown, StopAdjuster, StopAdjustment,
    StoppedStudentCalculator,
};
pub use config::{BillingConfig, LegacyNoteMarkers};
pub use decimal::{Money, Percent};
pub use engine::{BillingEngine, StudentLocks};
pub use errors::{BillingError, ErrorCategory, Result};
pub use events::{Event, EventStore};
pub use model::{AttendanceRecord, Enrollment, Group, PaymentRecord, Session, Student};
pub use reports::{AccountSummary, BalanceView, GroupSummary, ReportBuilder};
pub use store::{
    BillingStore, EnrollmentSource, InMemoryStore, InsertOutcome, ResolutionStrategy,
    ResolvedEnrollments,
};
pub use types::{
    AdjustmentKey, AttendanceCategory, AttendanceStatus, BalanceMode, DepositId, EnrollmentStatus,
    GroupId, PaymentId, PaymentKind, PaymentSource, SessionId, StudentId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
