pub mod persistence;
pub mod reclaimer;
pub mod record;
pub mod redis_persistence;
pub mod registry;
pub mod store;

pub use persistence::{InMemoryPersistence, TaskPersistence};
pub use reclaimer::LeaseReclaimer;
pub use record::{now_ms, TaskId, TaskOutcome, TaskRecord, TaskStatus};
pub use redis_persistence::RedisPersistence;
pub use registry::ServerRegistry;
pub use store::TaskStore;
