use std::sync::Arc;
use school_billing_rs::BillingStore;

use school_billing_rs::chrono::{NaiveDate, TimeZone, Utc};
use school_billing_rs::{
    AdjustmentOutcome, AttendanceStatus, BalanceMode, BillingEngine, BillingError,
    CreditAllocationRequest, DepositRequest, Enrollment, ErrorCategory, Event, Group,
    InMemoryStore, LegacyPayment, Money, PaymentKind, Percent, ResolutionStrategy,
    SafeTimeProvider, Session, Student, TimeSource,
};

fn day(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

fn clock() -> SafeTimeProvider {
    SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 11, 15, 10, 0, 0).unwrap()))
}

struct School {
    store: Arc<InMemoryStore>,
    engine: BillingEngine,
    group: Group,
    sessions: Vec<Session>,
}

fn school() -> School {
    let store = Arc::new(InMemoryStore::new());
    let group = Group::new("english b2", Money::from_major(1000), 10, day(10, 1));
    store.insert_group(group.clone()).unwrap();
    let sessions: Vec<Session> = (1..=10).map(|d| Session::new(group.id, day(10, d))).collect();
    for session in &sessions {
        store.insert_session(*session).unwrap();
    }
    let engine = BillingEngine::with_defaults(store.clone());
    School {
        store,
        engine,
        group,
        sessions,
    }
}

fn enroll(school: &School, name: &str, discount: u32) -> Student {
    let student = Student::new(name).with_discount(Percent::from_percentage(discount));
    school.store.insert_student(student.clone()).unwrap();
    school
        .store
        .insert_enrollment(Enrollment::active(student.id, school.group.id))
        .unwrap();
    student
}

#[test]
fn full_term_then_stop_and_refund() {
    let s = school();
    let student = enroll(&s, "amina", 0);
    let time = clock();

    let receipt = s
        .engine
        .deposit_and_allocate(
            DepositRequest::new(student.id, Money::from_major(1500), day(10, 1)).with_admin("desk"),
            &time,
        )
        .unwrap();
    assert_eq!(receipt.allocations.len(), 2);
    assert!(s.engine.student_balance(student.id).unwrap().is_settled());

    use AttendanceStatus::*;
    for (session, status) in s.sessions.iter().zip([Present, Present, Present, Present, Absent, Absent, Justified, Justified]) {
        s.engine.record_attendance(session.id, student.id, status, &time).unwrap();
    }

    // the course was paid in full, so excused sessions are refundable credit
    let payments = s.store.payments_for_student(student.id).unwrap();
    let credits: Vec<_> = payments.iter().filter(|p| p.kind == PaymentKind::BalanceCredit).collect();
    assert_eq!(credits.len(), 2);

    let stop = s
        .engine
        .record_attendance(s.sessions[8].id, student.id, Stop, &time)
        .unwrap();
    let record = stop.adjustment.record().unwrap();
    assert_eq!(record.kind, PaymentKind::BalanceCredit);
    assert_eq!(record.amount, Money::from_major(400));

    let balance = s.engine.student_balance(student.id).unwrap();
    assert_eq!(balance.mode, BalanceMode::StoppedStudent);
    assert_eq!(balance.remaining_balance, Money::from_major(-600));

    let refunds = s.engine.refund_list().unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].net_balance, Money::from_major(400));
    assert!(s.engine.debts_list().unwrap().is_empty());

    let events = s.engine.take_events().unwrap();
    assert!(events.iter().any(|e| matches!(e, Event::DepositReceived { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::AdjustmentApplied { kind: PaymentKind::BalanceCredit, .. })));
}

#[test]
fn underpaid_stop_lands_on_debt_list() {
    let s = school();
    let student = enroll(&s, "omar", 0);
    let time = clock();

    s.engine
        .deposit(student.id, Money::from_major(800), day(10, 1), Some("first installment"), None, &time)
        .unwrap();
    for session in &s.sessions[..7] {
        s.engine
            .record_attendance(session.id, student.id, AttendanceStatus::Present, &time)
            .unwrap();
    }
    let stop = s
        .engine
        .record_attendance(s.sessions[7].id, student.id, AttendanceStatus::Stop, &time)
        .unwrap();

    // 300 paid against 700 owed: free sessions are credited, the shortfall stays
    let record = stop.adjustment.record().unwrap();
    assert_eq!(record.kind, PaymentKind::AttendanceCredit);
    assert_eq!(record.amount, Money::from_major(300));

    let debts = s.engine.debts_list().unwrap();
    assert_eq!(debts.len(), 1);
    assert_eq!(debts[0].net_balance, Money::from_major(-400));
    assert_eq!(debts[0].reported_balance, Money::from_major(-700));
}

#[test]
fn deposits_respect_discount_and_priority() {
    let s = school();
    let student = enroll(&s, "sara", 20);
    let later = Group::new("maths", Money::from_major(500), 5, day(11, 1));
    s.store.insert_group(later.clone()).unwrap();
    s.store.insert_enrollment(Enrollment::active(student.id, later.id)).unwrap();

    let receipt = s
        .engine
        .deposit(student.id, Money::from_major(1500), day(10, 2), None, None, &clock())
        .unwrap();

    let summary: Vec<_> = receipt
        .allocations
        .iter()
        .map(|r| (r.kind, r.group_id, r.amount, r.original_amount))
        .collect();
    assert_eq!(
        summary,
        vec![
            (PaymentKind::RegistrationFee, None, Money::from_major(400), Money::from_major(500)),
            (PaymentKind::GroupPayment, Some(s.group.id), Money::from_major(800), Money::from_major(1000)),
            (PaymentKind::GroupPayment, Some(later.id), Money::from_major(300), Money::from_major(375)),
        ]
    );
    assert!(receipt.allocations.iter().all(|r| r.has_notes()));
    assert_eq!(
        s.engine.student_balance(student.id).unwrap().remaining_balance,
        Money::from_major(-100)
    );
}

#[test]
fn legacy_import_then_spend_credit() {
    let s = school();
    let student = enroll(&s, "youssef", 0);
    let time = clock();

    for (group_id, amount, notes) in [
        (None, 500, "inscription"),
        (Some(s.group.id), 1000, "virement"),
        (None, 200, "avance"),
        (Some(s.group.id), 1000, "auto-generated placeholder"),
    ] {
        s.engine
            .import_legacy_payment(
                LegacyPayment {
                    student_id: student.id,
                    group_id,
                    amount: Money::from_major(amount),
                    date: day(9, 1),
                    notes: Some(notes.to_string()),
                    discount_percent: Percent::ZERO,
                    admin: None,
                },
                &time,
            )
            .unwrap();
    }

    let balance = s.engine.student_balance(student.id).unwrap();
    assert_eq!(balance.strategy, ResolutionStrategy::EnrollmentRows);
    assert_eq!(balance.total_paid, Money::from_major(1500));
    assert_eq!(balance.credit, Money::from_major(200));
    assert_eq!(balance.remaining_balance, Money::from_major(200));

    // a second course arrives; only credit beyond what is owed can be spent
    let extra = Group::new("physics", Money::from_major(100), 3, day(11, 4));
    s.store.insert_group(extra.clone()).unwrap();
    s.store.insert_enrollment(Enrollment::active(student.id, extra.id)).unwrap();

    let records = s
        .engine
        .allocate_from_existing_credit(CreditAllocationRequest::new(student.id), &time)
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].group_id, Some(extra.id));
    assert_eq!(records[0].amount, Money::from_major(100));
    assert_eq!(records[0].date, day(11, 15));

    let balance = s.engine.student_balance(student.id).unwrap();
    assert!(balance.is_settled());
    assert_eq!(balance.credit, Money::from_major(100));
    assert_eq!(balance.remaining_balance, Money::from_major(100));
}

#[test]
fn replayed_attendance_writes_once() {
    let s = school();
    let student = enroll(&s, "lina", 0);
    let time = clock();

    let first = s
        .engine
        .record_attendance(s.sessions[0].id, student.id, AttendanceStatus::Justified, &time)
        .unwrap();
    let replay = s
        .engine
        .record_attendance(s.sessions[0].id, student.id, AttendanceStatus::Justified, &time)
        .unwrap();

    assert!(matches!(first.adjustment, AdjustmentOutcome::Recorded(_)));
    assert!(matches!(replay.adjustment, AdjustmentOutcome::Duplicate(_)));
    assert_eq!(s.store.payments_for_student(student.id).unwrap().len(), 1);
}

#[test]
fn missing_data_surfaces_as_errors() {
    let s = school();
    let student = enroll(&s, "nadia", 0);

    let err = s.engine.student_balance(school_billing_rs::Uuid::new_v4()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);

    let mut unpriced = s.group.clone();
    unpriced.price = None;
    s.store.insert_group(unpriced).unwrap();
    let err = s
        .engine
        .deposit(student.id, Money::from_major(100), day(10, 1), None, None, &clock())
        .unwrap_err();
    assert!(matches!(err, BillingError::MissingGroupPrice { .. }));
    assert!(err.to_string().contains("group price missing"));
    assert!(s.store.payments_for_student(student.id).unwrap().is_empty());
}

#[test]
fn student_listed_only_after_last_group_stops() {
    let s = school();
    let student = enroll(&s, "rania", 0);
    let evening = Group::new("english evening", Money::from_major(500), 5, day(10, 1));
    s.store.insert_group(evening.clone()).unwrap();
    s.store.insert_enrollment(Enrollment::active(student.id, evening.id)).unwrap();
    let evening_sessions: Vec<Session> = (1..=5).map(|d| Session::new(evening.id, day(10, d))).collect();
    for session in &evening_sessions {
        s.store.insert_session(*session).unwrap();
    }
    let time = clock();

    s.engine
        .deposit(student.id, Money::from_major(2000), day(10, 1), None, None, &time)
        .unwrap();
    for session in &s.sessions[..2] {
        s.engine
            .record_attendance(session.id, student.id, AttendanceStatus::Present, &time)
            .unwrap();
    }
    s.engine
        .record_attendance(s.sessions[2].id, student.id, AttendanceStatus::Stop, &time)
        .unwrap();

    // one group still running keeps the student off both lists
    assert_eq!(s.engine.student_balance(student.id).unwrap().mode, BalanceMode::ActiveStudent);
    assert!(s.engine.refund_list().unwrap().is_empty());
    assert!(s.engine.debts_list().unwrap().is_empty());

    s.engine
        .record_attendance(evening_sessions[0].id, student.id, AttendanceStatus::Stop, &time)
        .unwrap();

    assert_eq!(s.engine.student_balance(student.id).unwrap().mode, BalanceMode::StoppedStudent);
    let refunds = s.engine.refund_list().unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].student_id, student.id);
}
