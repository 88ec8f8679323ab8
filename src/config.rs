use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{BillingError, Result};

/// billing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// registration fee before the student's discount
    pub registration_fee: Money,
    /// constant price the old system substituted for unpriced groups.
    /// only the stopped-student calculator honours it; unset means fail fast.
    pub legacy_fallback_price: Option<Money>,
    pub legacy_markers: LegacyNoteMarkers,
}

/// note fragments used to classify payments imported from the old system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyNoteMarkers {
    pub registration: Vec<String>,
    pub system: Vec<String>,
    pub refund: Vec<String>,
    pub debt: Vec<String>,
    pub attendance_credit: Vec<String>,
    pub balance_credit: Vec<String>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            registration_fee: Money::from_major(500),
            legacy_fallback_price: None,
            legacy_markers: LegacyNoteMarkers::default(),
        }
    }
}

impl Default for LegacyNoteMarkers {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            registration: owned(&["registration fee", "frais d'inscription", "inscription"]),
            system: owned(&["auto-generated", "placeholder", "system"]),
            refund: owned(&["refund", "remboursement"]),
            debt: owned(&["debt", "dette"]),
            attendance_credit: owned(&["attendance credit", "session credit"]),
            balance_credit: owned(&["balance credit", "excess"]),
        }
    }
}

impl BillingConfig {
    /// parse configuration from json, missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: BillingConfig =
            serde_json::from_str(json).map_err(|e| BillingError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.registration_fee.is_negative() {
            return Err(BillingError::InvalidConfiguration {
                message: format!("registration fee must not be negative: {}", self.registration_fee),
            });
        }

        if let Some(price) = self.legacy_fallback_price {
            if !price.is_positive() {
                return Err(BillingError::InvalidConfiguration {
                    message: format!("legacy fallback price must be positive: {}", price),
                });
            }
        }

        if self.legacy_markers.registration.is_empty() {
            return Err(BillingError::InvalidConfiguration {
                message: "at least one registration note marker is required".to_string(),
            });
        }

        Ok(())
    }

    pub fn with_registration_fee(mut self, fee: Money) -> Self {
        self.registration_fee = fee;
        self
    }

    pub fn with_legacy_fallback_price(mut self, price: Money) -> Self {
        self.legacy_fallback_price = Some(price);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registration_fee() {
        let config = BillingConfig::default();
        assert_eq!(config.registration_fee, Money::from_major(500));
        assert!(config.legacy_fallback_price.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = BillingConfig::from_json(r#"{ "registration_fee": "350" }"#).unwrap();
        assert_eq!(config.registration_fee, Money::from_major(350));
        assert!(!config.legacy_markers.registration.is_empty());
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = BillingConfig::from_json(r#"{ "registration_fee": "-1" }"#).unwrap_err();
        assert!(matches!(err, BillingError::InvalidConfiguration { .. }));

        let err = BillingConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, BillingError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_fallback_price_must_be_positive() {
        let config = BillingConfig::default().with_legacy_fallback_price(Money::ZERO);
        assert!(config.validate().is_err());
    }
}
