//! Journal taxonomy aggregation, featured-article selection, subject flagging and Atom
//! article feeds for a scholarly publishing platform.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
