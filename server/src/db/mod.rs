//! Database module for PostgreSQL persistence (Store B).

mod pool;
mod records;

pub use pool::*;
pub use records::*;
