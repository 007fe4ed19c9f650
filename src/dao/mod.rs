/// Durable list stores backing the seed counters.
pub mod seed_store;
/// Storage abstraction layer errors.
pub mod storage;
