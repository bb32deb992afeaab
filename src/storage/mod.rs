//! Per-base persistence: SQLite databases and knowledge base management

mod bases;
mod database;

pub use bases::{BaseHandle, BaseInfo, BaseManager};
pub use database::{BaseDb, BaseStats, ChatEntry, FileStatus, StoredChunk};
