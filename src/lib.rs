//! Document store over a remote text/vector search engine.

pub mod application;
pub mod domain;
pub mod infrastructure;
