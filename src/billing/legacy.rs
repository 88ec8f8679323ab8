//! Import of payment rows written before payment kinds were explicit.
//!
//! Old rows only carried free-text notes. The kind is recovered from
//! configurable note markers, once, at import time; nothing else in the
//! crate looks at note text.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::LegacyNoteMarkers;
use crate::decimal::{Money, Percent};
use crate::model::PaymentRecord;
use crate::types::{GroupId, PaymentKind, PaymentSource, StudentId};

/// payment row as stored by the old system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyPayment {
    pub student_id: StudentId,
    pub group_id: Option<GroupId>,
    pub amount: Money,
    pub date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub discount_percent: Percent,
    #[serde(default)]
    pub admin: Option<String>,
}

/// kind recovered from a legacy row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyClassification {
    pub kind: PaymentKind,
    pub system_generated: bool,
}

fn matches_any(notes: &str, markers: &[String]) -> bool {
    markers
        .iter()
        .any(|marker| !marker.is_empty() && notes.contains(&marker.to_lowercase()))
}

impl LegacyClassification {
    pub fn classify(payment: &LegacyPayment, markers: &LegacyNoteMarkers) -> Self {
        let notes = payment
            .notes
            .as_deref()
            .map(|n| n.trim().to_lowercase())
            .unwrap_or_default();

        let kind = if matches_any(&notes, &markers.refund) {
            PaymentKind::Refund
        } else if matches_any(&notes, &markers.debt) {
            PaymentKind::DebtPayment
        } else if matches_any(&notes, &markers.attendance_credit) {
            PaymentKind::AttendanceCredit
        } else if matches_any(&notes, &markers.balance_credit) {
            PaymentKind::BalanceCredit
        } else if payment.group_id.is_none() && matches_any(&notes, &markers.registration) {
            PaymentKind::RegistrationFee
        } else if payment.group_id.is_some() {
            PaymentKind::GroupPayment
        } else {
            PaymentKind::BalanceAddition
        };

        Self {
            kind,
            system_generated: matches_any(&notes, &markers.system),
        }
    }
}

impl LegacyPayment {
    pub fn into_record(self, markers: &LegacyNoteMarkers) -> PaymentRecord {
        let classification = LegacyClassification::classify(&self, markers);
        let mut record = PaymentRecord::new(
            self.student_id,
            self.group_id,
            classification.kind,
            self.amount,
            self.date,
            PaymentSource::Imported,
        )
        .with_discount(self.discount_percent)
        .with_admin(self.admin);
        record.notes = self.notes;
        record.system_generated = classification.system_generated;
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn legacy(group: Option<GroupId>, notes: Option<&str>) -> LegacyPayment {
        LegacyPayment {
            student_id: Uuid::new_v4(),
            group_id: group,
            amount: Money::from_major(100),
            date: NaiveDate::from_ymd_opt(2023, 9, 1).unwrap(),
            notes: notes.map(str::to_string),
            discount_percent: Percent::ZERO,
            admin: None,
        }
    }

    fn kind_of(group: Option<GroupId>, notes: Option<&str>) -> PaymentKind {
        LegacyClassification::classify(&legacy(group, notes), &LegacyNoteMarkers::default()).kind
    }

    #[test]
    fn test_note_markers() {
        let group = Some(Uuid::new_v4());

        assert_eq!(kind_of(None, Some("Frais d'inscription")), PaymentKind::RegistrationFee);
        assert_eq!(kind_of(None, Some("cash")), PaymentKind::BalanceAddition);
        assert_eq!(kind_of(None, None), PaymentKind::BalanceAddition);
        assert_eq!(kind_of(group, Some("cash")), PaymentKind::GroupPayment);
        assert_eq!(kind_of(group, Some("Remboursement partiel")), PaymentKind::Refund);
        assert_eq!(kind_of(group, Some("dette septembre")), PaymentKind::DebtPayment);
        assert_eq!(kind_of(group, Some("session credit")), PaymentKind::AttendanceCredit);
        assert_eq!(kind_of(group, Some("excess after stop")), PaymentKind::BalanceCredit);
    }

    #[test]
    fn test_registration_marker_needs_unassigned_row() {
        assert_eq!(
            kind_of(Some(Uuid::new_v4()), Some("inscription")),
            PaymentKind::GroupPayment
        );
    }

    #[test]
    fn test_system_rows_flagged() {
        let payment = legacy(Some(Uuid::new_v4()), Some("Auto-generated placeholder"));
        let record = payment.into_record(&LegacyNoteMarkers::default());

        assert!(record.system_generated);
        assert_eq!(record.kind, PaymentKind::GroupPayment);
        assert_eq!(record.source, PaymentSource::Imported);
    }

    #[test]
    fn test_custom_markers() {
        let markers = LegacyNoteMarkers {
            refund: vec!["payback".to_string()],
            ..LegacyNoteMarkers::default()
        };
        let classification =
            LegacyClassification::classify(&legacy(None, Some("PAYBACK to parent")), &markers);
        assert_eq!(classification.kind, PaymentKind::Refund);
    }
}
