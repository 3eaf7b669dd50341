//! Database entities.

pub mod conversations;
