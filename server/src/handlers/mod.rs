//! Request handlers for the record API.

mod records;

pub use records::*;
