// src/db.rs

pub mod store;
pub use store::{SubscriptionStore, LICENSE_BULK_OPERATION_BATCH_SIZE};

pub mod memory_store;
pub use memory_store::MemorySubscriptionStore;

pub mod agreement_repo;
pub mod history_repo;
pub mod license_repo;
pub mod subscription_repo;

pub mod pg_store;
pub use pg_store::PgSubscriptionStore;
