//! Ledger service: the single writer in front of a [`Ledger`].
//!
//! Every mutation goes through the same pipeline:
//!
//! ```text
//! command / remote event
//!   ↓
//! 1. Decide against the current snapshot (pure, no mutation)
//!   ↓
//! 2. Persist the resulting records to the store
//!   ↓
//! 3. Apply to the in-memory ledger (copy-on-write snapshot swap)
//!   ↓
//! 4. Publish an envelope on the bus (local commands only)
//! ```
//!
//! Writers are serialized by one mutex, so appends are linearizable. Readers
//! clone an `Arc<Ledger>` and never wait on store IO. If the store refuses an
//! append, the in-memory ledger is left untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use tally_accounting::{
    Account, Balances, Category, EntryDraft, EntryPosted, HistoryPolicy, HydrationReport, Ledger,
    LedgerCommand, LedgerError, LedgerEvent, LedgerResult, StatementTotals,
};
use tally_events::{Event, EventBus, EventEnvelope};

use crate::config::LedgerConfig;
use crate::store::{LedgerStore, StoreError};

/// Envelope type carried on the bus between ledger replicas.
pub type LedgerEnvelope = EventEnvelope<LedgerEvent>;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The ledger refused the command or event (deterministic; do not retry).
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Persisting or loading failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("ledger state lock poisoned")]
    Poisoned,
}

impl ServiceError {
    /// Whether the same call may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Store(err) => err.is_transient(),
            ServiceError::Ledger(_) | ServiceError::Poisoned => false,
        }
    }
}

/// Result of delivering a remote event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    /// The identical record is already in the ledger; nothing was written.
    AlreadyPresent,
}

pub struct LedgerService<S, B> {
    store: S,
    bus: B,
    source: String,
    state: RwLock<Arc<Ledger>>,
    writer: Mutex<()>,
    sequence: AtomicU64,
}

impl<S, B> core::fmt::Debug for LedgerService<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LedgerService")
            .field("source", &self.source)
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<S, B> LedgerService<S, B>
where
    S: LedgerStore,
    B: EventBus<LedgerEnvelope>,
{
    /// Load history from `store` and hydrate a ledger under `policy`.
    #[instrument(skip(store, bus, source), fields(source = tracing::field::Empty))]
    pub fn open(
        store: S,
        bus: B,
        source: impl Into<String>,
        policy: HistoryPolicy,
    ) -> Result<(Self, HydrationReport), ServiceError> {
        let source = source.into();
        tracing::Span::current().record("source", source.as_str());

        let accounts = store.load_accounts()?;
        let postings = store.load_postings()?;
        let (ledger, report) = Ledger::hydrate(accounts, postings, policy)?;

        let committed = (ledger.chart().len() + ledger.journal().entry_count()) as u64;
        let service = Self {
            store,
            bus,
            source,
            state: RwLock::new(Arc::new(ledger)),
            writer: Mutex::new(()),
            sequence: AtomicU64::new(committed),
        };

        Ok((service, report))
    }

    pub fn from_config(
        store: S,
        bus: B,
        config: &LedgerConfig,
    ) -> Result<(Self, HydrationReport), ServiceError> {
        Self::open(store, bus, config.source.clone(), config.history_policy)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Current ledger state. Later commits do not affect the returned snapshot.
    pub fn snapshot(&self) -> Result<Arc<Ledger>, ServiceError> {
        let state = self.state.read().map_err(|_| ServiceError::Poisoned)?;
        Ok(Arc::clone(&state))
    }

    /// Decide, persist, apply and publish one command.
    #[instrument(skip(self), fields(source = %self.source))]
    pub fn execute(&self, command: LedgerCommand) -> Result<LedgerEvent, ServiceError> {
        self.run(|ledger, now| ledger.handle(&command, now))
    }

    #[instrument(skip(self), fields(source = %self.source))]
    pub fn register(&self, code: u32, name: &str) -> Result<Account, ServiceError> {
        let registered =
            self.run(|ledger, now| ledger.decide_account(Account::new(code, name)?, now))?;
        Ok(registered.account)
    }

    #[instrument(skip(self), fields(source = %self.source))]
    pub fn open_account(&self, category: Category, name: &str) -> Result<Account, ServiceError> {
        let registered = self.run(|ledger, now| {
            let account = Account::new(ledger.next_code(category)?, name)?;
            ledger.decide_account(account, now)
        })?;
        Ok(registered.account)
    }

    #[instrument(skip(self, draft), fields(source = %self.source, lines = draft.lines.len()))]
    pub fn post(&self, draft: EntryDraft) -> Result<EntryPosted, ServiceError> {
        self.run(|ledger, _| ledger.decide_entry(&draft))
    }

    /// Apply an event committed by another replica.
    ///
    /// Re-delivery of a record already present is a no-op. Remote events are
    /// persisted and applied but not re-published.
    #[instrument(
        skip(self, event),
        fields(source = %self.source, event_type = event.event_type())
    )]
    pub fn ingest(&self, event: LedgerEvent) -> Result<Delivery, ServiceError> {
        let _writer = self.writer.lock().map_err(|_| ServiceError::Poisoned)?;

        let current = self.snapshot()?;
        if current.contains(&event) {
            tracing::debug!("remote event already present");
            return Ok(Delivery::AlreadyPresent);
        }
        current.check(&event)?;
        drop(current);

        self.commit(&event)?;
        Ok(Delivery::Applied)
    }

    pub fn balances(&self) -> Result<Balances, ServiceError> {
        Ok(self.snapshot()?.balances())
    }

    pub fn balances_as_of(&self, cutoff: DateTime<Utc>) -> Result<Balances, ServiceError> {
        Ok(self.snapshot()?.balances_as_of(cutoff))
    }

    pub fn statement(&self) -> Result<StatementTotals, ServiceError> {
        Ok(self.snapshot()?.statement())
    }

    pub fn statement_as_of(&self, cutoff: DateTime<Utc>) -> Result<StatementTotals, ServiceError> {
        Ok(self.snapshot()?.statement_as_of(cutoff))
    }

    /// Decide against the current snapshot under the writer lock, then commit
    /// and publish the decided event.
    fn run<E>(
        &self,
        decide: impl FnOnce(&Ledger, DateTime<Utc>) -> LedgerResult<E>,
    ) -> Result<E, ServiceError>
    where
        E: Clone + Into<LedgerEvent>,
    {
        let _writer = self.writer.lock().map_err(|_| ServiceError::Poisoned)?;

        let current = self.snapshot()?;
        let decided = decide(current.as_ref(), Utc::now())?;
        drop(current);

        let event: LedgerEvent = decided.clone().into();
        self.commit(&event)?;
        self.publish(&event);

        Ok(decided)
    }

    /// Persist then apply. Caller holds the writer lock.
    fn commit(&self, event: &LedgerEvent) -> Result<(), ServiceError> {
        match event {
            LedgerEvent::AccountRegistered(e) => self.store.append_account(&e.account)?,
            LedgerEvent::EntryPosted(e) => self.store.append_entry(&e.postings)?,
        }

        let mut state = self.state.write().map_err(|_| ServiceError::Poisoned)?;
        Arc::make_mut(&mut *state).apply(event)?;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        match event {
            LedgerEvent::AccountRegistered(e) => {
                tracing::info!(
                    sequence,
                    code = e.account.code(),
                    name = %e.account.name,
                    "account registered"
                )
            }
            LedgerEvent::EntryPosted(e) => {
                tracing::info!(
                    sequence,
                    entry = %e.entry,
                    postings = e.postings.len(),
                    "entry posted"
                )
            }
        }
        Ok(())
    }

    /// Records are already durable here, so a bus failure only delays mirroring.
    fn publish(&self, event: &LedgerEvent) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        let envelope =
            EventEnvelope::new(Uuid::now_v7(), self.source.clone(), sequence, event.clone());
        if let Err(err) = self.bus.publish(envelope) {
            tracing::warn!(sequence, error = ?err, "publishing ledger event failed");
        }
    }
}
