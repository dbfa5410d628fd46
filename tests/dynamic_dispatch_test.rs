use chrono::NaiveDate;
use payouts::config::PayoutConfig;
use payouts::domain::balance::{Balance, BalanceId, ClaimOutcome};
use payouts::domain::money::Money;
use payouts::domain::payment::{PayoutType, ProcessorType};
use payouts::domain::ports::{BalanceStore, BalanceStoreRef, UserStore, UserStoreRef};
use payouts::domain::processor::PayabilityContext;
use payouts::domain::user::{User, UserId};
use payouts::infrastructure::in_memory::{InMemoryBalanceStore, InMemoryUserStore};
use payouts::infrastructure::processors::default_registry;
use rust_decimal_macros::dec;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
}

#[tokio::test]
async fn test_stores_as_trait_objects() {
    let user_store: UserStoreRef = std::sync::Arc::new(InMemoryUserStore::new());
    let balance_store: BalanceStoreRef = std::sync::Arc::new(InMemoryBalanceStore::new());

    // Verify Send + Sync by spawning tasks
    let us_handle = tokio::spawn(async move {
        user_store.store(User::new(UserId(1))).await.unwrap();
        user_store.get(UserId(1)).await.unwrap().unwrap()
    });

    let bs_handle = tokio::spawn(async move {
        let balance = Balance::new(BalanceId(1), UserId(1), day(1), Money::new(dec!(10)));
        balance_store.store(balance).await.unwrap();
        balance_store.claim(BalanceId(1)).await.unwrap()
    });

    assert_eq!(us_handle.await.unwrap().id, UserId(1));
    assert!(matches!(bs_handle.await.unwrap(), ClaimOutcome::Claimed(_)));
}

#[tokio::test]
async fn test_registry_dispatches_per_rail() {
    let registry = default_registry(&PayoutConfig::default());
    let rails: Vec<ProcessorType> = registry.all().map(|p| p.processor_type()).collect();
    assert_eq!(rails, ProcessorType::ALL.to_vec());

    let mut user = User::new(UserId(1));
    user.paypal_email = Some("seller@example.com".to_string());
    let ctx = PayabilityContext {
        amount: Money::new(dec!(50)),
        payout_type: PayoutType::Standard,
        today: day(16),
    };

    let paypal = registry.get(ProcessorType::Paypal).unwrap();
    let stripe = registry.get(ProcessorType::Stripe).unwrap();
    assert!(paypal.is_user_payable(&user, &ctx).is_payable());
    assert!(!stripe.is_user_payable(&user, &ctx).is_payable());
}
