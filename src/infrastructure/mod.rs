pub mod clock;
pub mod in_memory;
pub mod processors;
pub mod queue;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
