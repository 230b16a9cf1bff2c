//! Domain layer types and invariants.

pub mod error;
pub mod featured;
pub mod feed;
pub mod flags;
pub mod subjects;
pub mod types;
