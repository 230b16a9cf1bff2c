//! Application services: taxonomy, featured articles, flags and feeds.

pub mod error;
pub mod featured;
pub mod flags;
pub mod repos;
pub mod syndication;
pub mod taxonomy;
