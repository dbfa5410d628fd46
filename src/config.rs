use crate::domain::money::Money;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Tunables for payout eligibility, processor fees and the job worker.
///
/// Every field has a default, so a config file only needs to list the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PayoutConfig {
    /// Threshold applied to users without their own minimum.
    pub minimum_payout_amount: Money,
    /// Days between the end of a payout period and the scheduled payout.
    pub payout_delay_days: u64,
    pub paypal: PaypalConfig,
    pub stripe: StripeConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PaypalConfig {
    pub fee_percent: Decimal,
    pub max_fee: Money,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StripeConfig {
    pub instant_fee_percent: Decimal,
    pub minimum_instant_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub queue_capacity: usize,
    pub max_concurrent_jobs: usize,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            minimum_payout_amount: Money::from_cents(10_00),
            payout_delay_days: 7,
            paypal: PaypalConfig::default(),
            stripe: StripeConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Default for PaypalConfig {
    fn default() -> Self {
        Self {
            fee_percent: Decimal::new(2, 0),
            max_fee: Money::from_cents(20_00),
        }
    }
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            instant_fee_percent: Decimal::new(3, 0),
            minimum_instant_amount: Money::from_cents(10_00),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            max_concurrent_jobs: 8,
        }
    }
}

impl PayoutConfig {
    /// Loads a YAML config file, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path)?;
                Self::from_yaml(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }
}
