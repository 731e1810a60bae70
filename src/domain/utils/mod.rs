pub mod hashing;
pub mod id;
pub mod worker_pool;
