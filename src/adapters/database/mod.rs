pub mod memory;
pub mod sqlite;

pub use memory::MemoryDatabase;
pub use sqlite::SqliteDatabase;
