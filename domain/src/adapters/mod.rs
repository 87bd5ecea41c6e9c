//! Adapters that live inside the domain crate for convenience.
//!
//! The in-memory table backs unit tests, the fixture harness tests, and the
//! `memory` storage provider of the api-server. Real adapters (DynamoDB,
//! SQLite) live in separate crates.

pub mod memory_repo;
