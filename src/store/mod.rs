mod memory;
mod postgres;

pub use memory::MemoryAssignmentStore;
pub use postgres::PgAssignmentStore;
