//! Infrastructure layer: storage, the ledger service, sync ingestion, config.

pub mod config;
pub mod service;
pub mod store;
pub mod sync;


pub use config::{ConfigError, LedgerConfig};
pub use service::{Delivery, LedgerEnvelope, LedgerService, ServiceError};
pub use store::{InMemoryLedgerStore, JsonFileStore, LedgerStore, StoreError};
pub use sync::{IngestOutcome, SyncIngestor, SyncStats};
