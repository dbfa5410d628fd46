//! Domain model: money, payees, balances, payments and the ports the
//! application layer depends on.

pub mod balance;
pub mod money;
pub mod payment;
pub mod ports;
pub mod processor;
pub mod user;
