// Lazarus Persistence Layer
//
// Durable record of tracked sessions, content-addressed snapshots, restore
// jobs and collector bookkeeping. The core depends only on the traits in
// `repository`; PostgreSQL backs production and an in-memory store backs
// tests and database-less runs.

mod error;
mod memory;
mod models;
mod postgres;
mod repository;

pub use error::{PersistenceError, PersistenceResult};
pub use memory::{MemoryProjection, MemoryStore};
pub use models::{JobRecord, SessionRecord, SnapshotRecord};
pub use postgres::PgStore;
pub use repository::{
    JobProgress, JobRepo, ProjectionReader, RecoveryStore, RuntimeStore, SessionRepo,
    SessionTransitions, SnapshotRepo, KEY_BOOT_ID, KEY_LAST_COLLECT_AT, KEY_LIVE_SESSIONS,
};
