/// attendance credits and the adjustment written when a student stops
use std::sync::Arc;

use school_billing_rs::chrono::{NaiveDate, TimeZone, Utc};
use school_billing_rs::{
    AttendanceStatus, BillingEngine, Enrollment, Group, InMemoryStore, Money, SafeTimeProvider,
    Session, Student, TimeSource,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 10, 1, 9, 0, 0).single().ok_or("bad time")?,
    ));

    let store = Arc::new(InMemoryStore::new());
    let student = Student::new("karim");
    let group = Group::new(
        "arabic a2",
        Money::from_major(1000),
        10,
        NaiveDate::from_ymd_opt(2024, 10, 1).ok_or("bad date")?,
    );
    store.insert_student(student.clone())?;
    store.insert_group(group.clone())?;
    store.insert_enrollment(Enrollment::active(student.id, group.id))?;

    let mut sessions = Vec::new();
    for day in 1..=10 {
        let date = NaiveDate::from_ymd_opt(2024, 10, day).ok_or("bad date")?;
        let session = Session::new(group.id, date);
        store.insert_session(session)?;
        sessions.push(session);
    }

    let engine = BillingEngine::with_defaults(store);
    engine.deposit(student.id, Money::from_major(1500), sessions[0].date, None, Some("desk"), &time)?;

    use AttendanceStatus::*;
    let marks = [Present, Present, Present, Present, Absent, Absent, Justified, Justified];
    for (session, status) in sessions.iter().zip(marks) {
        let outcome = engine.record_attendance(session.id, student.id, status, &time)?;
        if let Some(record) = outcome.adjustment.record() {
            println!("{} -> {:?} {}", status, record.kind, record.amount);
        }
    }

    // stop at the ninth session
    let outcome = engine.record_attendance(sessions[8].id, student.id, Stop, &time)?;
    if let Some(stop) = &outcome.stop {
        println!(
            "stop: {} obligatory, {} free, fee {}, paid {}",
            stop.breakdown.obligatory_sessions,
            stop.breakdown.free_sessions,
            stop.breakdown.actual_fee,
            stop.total_paid
        );
    }
    println!("{:?}", outcome.adjustment);

    println!("{}", engine.balance_view(student.id)?.json());
    for event in engine.take_events()? {
        println!("{:?}", event);
    }

    Ok(())
}
