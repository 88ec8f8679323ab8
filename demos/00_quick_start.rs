/// quick start - one student, one group, one deposit
use std::sync::Arc;

use school_billing_rs::chrono::NaiveDate;
use school_billing_rs::{
    BillingEngine, DepositRequest, Enrollment, Group, InMemoryStore, Money, Percent, Student,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let start = NaiveDate::from_ymd_opt(2024, 9, 2).ok_or("bad date")?;

    // a student with a 10% discount in a 1000 course
    let store = Arc::new(InMemoryStore::new());
    let student = Student::new("amina").with_discount(Percent::from_percentage(10));
    let group = Group::new("english b1", Money::from_major(1000), 10, start);
    store.insert_student(student.clone())?;
    store.insert_group(group.clone())?;
    store.insert_enrollment(Enrollment::active(student.id, group.id))?;

    let engine = BillingEngine::with_defaults(store);

    // pay 1500: registration 450, course 900, 150 kept as credit
    let receipt = engine.deposit_and_allocate_now(
        DepositRequest::new(student.id, Money::from_major(1500), start).with_notes("cash at desk"),
    )?;
    for record in &receipt.allocations {
        println!("{:?} {} ({})", record.kind, record.amount, record.original_amount);
    }

    println!("{}", engine.balance_view(student.id)?.json());

    Ok(())
}
