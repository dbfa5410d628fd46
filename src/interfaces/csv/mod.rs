pub mod balance_reader;
pub mod payment_writer;
pub mod user_reader;
