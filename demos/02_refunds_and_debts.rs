/// refund and debt lists over stopped students, with imported legacy rows
use std::sync::Arc;

use school_billing_rs::chrono::{Duration, NaiveDate, TimeZone, Utc};
use school_billing_rs::{
    AttendanceStatus, BillingConfig, BillingEngine, Enrollment, Group, InMemoryStore,
    LegacyPayment, Money, Percent, SafeTimeProvider, Session, Student, TimeSource,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 12, 1, 9, 0, 0).single().ok_or("bad time")?,
    ));
    let start = NaiveDate::from_ymd_opt(2024, 9, 2).ok_or("bad date")?;

    let config = BillingConfig::from_json(r#"{ "registration_fee": "500" }"#)?;
    let store = Arc::new(InMemoryStore::new());
    let group = Group::new("french a1", Money::from_major(1200), 12, start);
    store.insert_group(group.clone())?;

    let mut sessions = Vec::new();
    for week in 0..12 {
        let session = Session::new(group.id, start + Duration::weeks(week));
        store.insert_session(session)?;
        sessions.push(session);
    }

    let engine = BillingEngine::new(store.clone(), config)?;

    // (name, sessions attended before stopping, paid in the old system)
    for (name, attended, paid) in [("sara", 3, 1700), ("youssef", 10, 900), ("lina", 7, 1200)] {
        let student = Student::new(name);
        store.insert_student(student.clone())?;
        store.insert_enrollment(Enrollment::active(student.id, group.id))?;

        engine.import_legacy_payment(
            LegacyPayment {
                student_id: student.id,
                group_id: None,
                amount: Money::from_major(500),
                date: start,
                notes: Some("Frais d'inscription".to_string()),
                discount_percent: Percent::ZERO,
                admin: None,
            },
            &time,
        )?;
        engine.import_legacy_payment(
            LegacyPayment {
                student_id: student.id,
                group_id: Some(group.id),
                amount: Money::from_major(paid - 500),
                date: start,
                notes: Some("versement".to_string()),
                discount_percent: Percent::ZERO,
                admin: Some("legacy".to_string()),
            },
            &time,
        )?;

        for session in &sessions[..attended] {
            engine.record_attendance(session.id, student.id, AttendanceStatus::Present, &time)?;
        }
        engine.record_attendance(sessions[attended].id, student.id, AttendanceStatus::Stop, &time)?;
    }

    println!("refunds:");
    for account in engine.refund_list()? {
        println!("  {} net {} (reported {})", account.name, account.net_balance, account.reported_balance);
    }

    println!("debts:");
    for account in engine.debts_list()? {
        println!("  {} net {} (reported {})", account.name, account.net_balance, account.reported_balance);
    }

    Ok(())
}

