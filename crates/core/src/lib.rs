//! `tally-core`: strongly-typed identifiers shared by every ledger crate.
//!
//! This crate contains **pure domain** primitives (no storage, no logging setup).

pub mod error;
pub mod id;

pub use error::IdError;
pub use id::{AccountId, EntryId, PostingId};
