//! Integration Test Harness
//!
//! Shared fixtures for end-to-end combat tests:
//! - `TestTable` - A seeded party and battle session on an in-memory store
//! - `GatedStore` - Store wrapper that can hold writes mid-flight
//!
//! # Example
//!
//! ```rust,ignore
//! use harness::TestTable;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_turn_start() {
//!     let table = TestTable::start().await.unwrap();
//!     let lune = table.client(Role::Player, Some("lune")).await.unwrap();
//!     table.set_turn(1, "lune").await.unwrap();
//! }
//! ```

mod gated;
mod table;

pub use gated::GatedStore;
pub use table::TestTable;
