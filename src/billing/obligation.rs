//! Obligation model: what a student owes, derived from stored group data.

use rust_decimal::Decimal;

use crate::config::BillingConfig;
use crate::decimal::{Money, Percent};
use crate::errors::{BillingError, Result};
use crate::model::Group;

/// registration fee after the student's discount
pub fn registration_obligation(config: &BillingConfig, discount: Percent) -> Money {
    config.registration_fee.discounted(discount)
}

/// full course price, failing when the group has none
pub fn require_price(group: &Group) -> Result<Money> {
    match group.price {
        Some(price) if price.is_positive() => Ok(price),
        _ => Err(BillingError::MissingGroupPrice { group_id: group.id }),
    }
}

/// course price, or the configured legacy constant when the group has none
pub fn price_or_fallback(group: &Group, fallback: Option<Money>) -> Result<Money> {
    match (require_price(group), fallback) {
        (Ok(price), _) => Ok(price),
        (Err(_), Some(fallback)) => {
            tracing::warn!(group = %group.id, price = %fallback, "group has no price, using legacy fallback");
            Ok(fallback)
        }
        (Err(e), None) => Err(e),
    }
}

pub fn require_total_sessions(group: &Group) -> Result<u32> {
    match group.total_sessions {
        Some(total) if total > 0 => Ok(total),
        _ => Err(BillingError::MissingTotalSessions { group_id: group.id }),
    }
}

/// course price after the student's discount
pub fn group_obligation(group: &Group, discount: Percent) -> Result<Money> {
    Ok(require_price(group)?.discounted(discount))
}

/// undiscounted price of one session
pub fn session_fee(group: &Group) -> Result<Money> {
    let price = require_price(group)?;
    per_session(price, group)
}

/// undiscounted price of one session, honouring the legacy price fallback
pub fn session_fee_with_fallback(group: &Group, config: &BillingConfig) -> Result<Money> {
    let price = price_or_fallback(group, config.legacy_fallback_price)?;
    per_session(price, group)
}

fn per_session(price: Money, group: &Group) -> Result<Money> {
    let total = require_total_sessions(group)?;
    Ok(price / Decimal::from(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn group(price: Option<i64>, sessions: Option<u32>) -> Group {
        let mut group = Group::new(
            "french a1",
            Money::from_major(1000),
            10,
            NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
        );
        group.price = price.map(Money::from_major);
        group.total_sessions = sessions;
        group
    }

    #[test]
    fn test_registration_discount() {
        let config = BillingConfig::default();
        assert_eq!(registration_obligation(&config, Percent::ZERO), Money::from_major(500));
        assert_eq!(
            registration_obligation(&config, Percent::from_percentage(10)),
            Money::from_major(450)
        );
    }

    #[test]
    fn test_group_obligation_discount() {
        let g = group(Some(1000), Some(10));
        assert_eq!(
            group_obligation(&g, Percent::from_percentage(25)).unwrap(),
            Money::from_major(750)
        );
    }

    #[test]
    fn test_session_fee_undiscounted() {
        let g = group(Some(1000), Some(10));
        assert_eq!(session_fee(&g).unwrap(), Money::from_major(100));
    }

    #[test]
    fn test_missing_pricing_fails_fast() {
        let no_price = group(None, Some(10));
        assert!(matches!(
            group_obligation(&no_price, Percent::ZERO),
            Err(BillingError::MissingGroupPrice { .. })
        ));

        let no_sessions = group(Some(1000), Some(0));
        assert!(matches!(
            session_fee(&no_sessions),
            Err(BillingError::MissingTotalSessions { .. })
        ));
    }

    #[test]
    fn test_legacy_fallback_price() {
        let no_price = group(None, Some(10));
        let config = BillingConfig::default().with_legacy_fallback_price(Money::from_major(800));

        assert_eq!(session_fee_with_fallback(&no_price, &config).unwrap(), Money::from_major(80));
        assert!(session_fee_with_fallback(&no_price, &BillingConfig::default()).is_err());
    }
}
