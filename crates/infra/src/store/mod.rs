//! Storage collaborator boundary.
//!
//! The ledger never decides how or where records live; it talks to a
//! [`LedgerStore`]. Two implementations ship here: an in-memory store for
//! tests/dev and a single-document JSON file store for the CLI.

pub mod in_memory;
pub mod json_file;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use json_file::{JsonFileStore, LedgerDocument};
pub use r#trait::{LedgerStore, StoreError};
