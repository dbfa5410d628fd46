//! Application layer containing the payout business logic.
//!
//! `EligibilityEvaluator` decides who can be paid, `PayoutOrchestrator`
//! claims balances and creates payments, and `PayoutWorker` drains the job
//! queue with one `tokio` task per user.

pub mod eligibility;
pub mod orchestrator;
pub mod worker;
