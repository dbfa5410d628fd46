//! In-process payout rails. Gateway calls are out of scope; these decide
//! payability, fees and job fan-out.

pub mod paypal;
pub mod stripe;

use crate::config::PayoutConfig;
use crate::domain::processor::ProcessorRegistry;
use paypal::PaypalPayoutProcessor;
use std::sync::Arc;
use stripe::StripePayoutProcessor;

/// A registry with every built-in rail configured from `config`.
pub fn default_registry(config: &PayoutConfig) -> ProcessorRegistry {
    ProcessorRegistry::new()
        .register(Arc::new(PaypalPayoutProcessor::new(config.paypal.clone())))
        .register(Arc::new(StripePayoutProcessor::new(config.stripe.clone())))
}
