//! Sync ingestion: feeds envelopes published by peer replicas into a local
//! [`LedgerService`].
//!
//! Delivery is at-least-once, so the ingestor tolerates:
//! - echoes of this replica's own events (dropped by source name)
//! - re-delivery of records already applied (no-op)
//! - records that conflict with local history or with the store (rejected,
//!   counted, logged)
//!
//! Transient store failures are not swallowed: the envelope is kept and retried
//! first on the next [`SyncIngestor::drain`]. A poisoned service is treated the
//! same way, since no later envelope could be applied either.

use std::sync::Arc;

use tracing::instrument;

use tally_accounting::LedgerError;
use tally_events::{EventBus, Subscription};

use crate::service::{Delivery, LedgerEnvelope, LedgerService, ServiceError};
use crate::store::LedgerStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Applied,
    Duplicate,
    Echo,
    Rejected(LedgerError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub applied: u64,
    pub duplicates: u64,
    pub echoes: u64,
    pub rejected: u64,
}

pub struct SyncIngestor<S, B> {
    service: Arc<LedgerService<S, B>>,
    pending: Option<LedgerEnvelope>,
    stats: SyncStats,
}

impl<S, B> SyncIngestor<S, B>
where
    S: LedgerStore,
    B: EventBus<LedgerEnvelope>,
{
    pub fn new(service: Arc<LedgerService<S, B>>) -> Self {
        Self {
            service,
            pending: None,
            stats: SyncStats::default(),
        }
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Whether an envelope is waiting to be retried.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    #[instrument(
        skip_all,
        fields(from = envelope.source(), sequence = envelope.sequence_number())
    )]
    pub fn handle(&mut self, envelope: &LedgerEnvelope) -> Result<IngestOutcome, ServiceError> {
        if envelope.source() == self.service.source() {
            self.stats.echoes += 1;
            return Ok(IngestOutcome::Echo);
        }

        match self.service.ingest(envelope.payload().clone()) {
            Ok(Delivery::Applied) => {
                self.stats.applied += 1;
                Ok(IngestOutcome::Applied)
            }
            Ok(Delivery::AlreadyPresent) => {
                self.stats.duplicates += 1;
                Ok(IngestOutcome::Duplicate)
            }
            Err(ServiceError::Ledger(err)) => {
                tracing::warn!(error = %err, "rejected remote ledger event");
                self.stats.rejected += 1;
                Ok(IngestOutcome::Rejected(err))
            }
            Err(err) => Err(err),
        }
    }

    /// Handle every envelope queued on `subscription` without blocking.
    ///
    /// Returns how many envelopes were handled. On a retryable failure the
    /// failing envelope is parked and the error returned; any other failure
    /// drops the envelope as rejected and draining continues.
    pub fn drain(
        &mut self,
        subscription: &Subscription<LedgerEnvelope>,
    ) -> Result<usize, ServiceError> {
        let mut handled = 0;

        if let Some(envelope) = self.pending.take() {
            self.deliver(envelope)?;
            handled += 1;
        }

        while let Ok(envelope) = subscription.try_recv() {
            self.deliver(envelope)?;
            handled += 1;
        }

        Ok(handled)
    }

    fn deliver(&mut self, envelope: LedgerEnvelope) -> Result<(), ServiceError> {
        match self.handle(&envelope) {
            Ok(_) => Ok(()),
            Err(err) if err.is_retryable() || matches!(err, ServiceError::Poisoned) => {
                self.pending = Some(envelope);
                Err(err)
            }
            Err(err) => {
                tracing::warn!(error = %err, "dropped remote ledger event");
                self.stats.rejected += 1;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use tally_accounting::{
        Account, AccountRegistered, EntryDraft, HistoryPolicy, LedgerEvent, Posting,
    };
    use tally_events::EventEnvelope;
    use tally_events::in_memory_bus::InMemoryEventBus;

    use crate::store::{InMemoryLedgerStore, StoreError};

    type Bus = Arc<InMemoryEventBus<LedgerEnvelope>>;
    type Service = LedgerService<InMemoryLedgerStore, Bus>;

    fn replica_on<S: LedgerStore>(store: S, source: &str, bus: &Bus) -> Arc<LedgerService<S, Bus>> {
        let (service, _) =
            LedgerService::open(store, Arc::clone(bus), source, HistoryPolicy::Reject).unwrap();
        Arc::new(service)
    }

    fn replica(source: &str, bus: &Bus) -> Arc<Service> {
        replica_on(InMemoryLedgerStore::new(), source, bus)
    }

    /// Store whose entry appends fail while a flag is set.
    #[derive(Default)]
    struct RefusingStore {
        inner: InMemoryLedgerStore,
        conflict: AtomicBool,
        offline: AtomicBool,
    }

    impl LedgerStore for RefusingStore {
        fn load_accounts(&self) -> Result<Vec<Account>, StoreError> {
            self.inner.load_accounts()
        }

        fn load_postings(&self) -> Result<Vec<Posting>, StoreError> {
            self.inner.load_postings()
        }

        fn append_account(&self, account: &Account) -> Result<(), StoreError> {
            self.inner.append_account(account)
        }

        fn append_entry(&self, postings: &[Posting]) -> Result<(), StoreError> {
            if self.conflict.load(Ordering::SeqCst) {
                return Err(StoreError::Conflict("entry already stored".into()));
            }
            if self.offline.load(Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            self.inner.append_entry(postings)
        }
    }

    /// Cash and Sales registered, then one 80.00 sale.
    fn sell(peer: &Service) {
        peer.register(10001, "Cash").unwrap();
        peer.register(40001, "Sales").unwrap();
        peer.post(EntryDraft::transfer(10001, 40001, Decimal::new(80, 0), Utc::now()))
            .unwrap();
    }

    fn envelope(source: &str, seq: u64, event: LedgerEvent) -> LedgerEnvelope {
        EventEnvelope::new(Uuid::now_v7(), source, seq, event)
    }

    #[test]
    fn mirrors_a_peer_through_the_bus() {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let phone = replica("phone", &bus);
        let laptop = replica("laptop", &bus);
        let sub = bus.subscribe();
        let mut ingestor = SyncIngestor::new(Arc::clone(&laptop));

        phone.register(10001, "Cash").unwrap();
        phone.register(40001, "Sales").unwrap();
        phone
            .post(EntryDraft::transfer(10001, 40001, Decimal::new(80, 0), Utc::now()))
            .unwrap();
        laptop.register(60001, "Rent").unwrap();

        assert_eq!(ingestor.drain(&sub).unwrap(), 4);
        assert_eq!(
            ingestor.stats(),
            SyncStats {
                applied: 3,
                duplicates: 0,
                echoes: 1,
                rejected: 0,
            }
        );

        let mirrored = laptop.snapshot().unwrap();
        assert_eq!(mirrored.chart().len(), 3);
        assert_eq!(mirrored.balances().balance_of(10001), Some(Decimal::new(80, 0)));
    }

    #[test]
    fn redelivery_is_a_duplicate() {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let local = replica("local", &bus);
        let mut ingestor = SyncIngestor::new(Arc::clone(&local));

        let event = LedgerEvent::AccountRegistered(AccountRegistered {
            account: Account::new(10001, "Cash").unwrap(),
            occurred_at: Utc::now(),
        });

        let first = ingestor.handle(&envelope("peer", 1, event.clone())).unwrap();
        let again = ingestor.handle(&envelope("peer", 1, event)).unwrap();
        assert_eq!(first, IngestOutcome::Applied);
        assert_eq!(again, IngestOutcome::Duplicate);
        assert_eq!(local.snapshot().unwrap().chart().len(), 1);
    }

    #[test]
    fn conflicting_record_is_rejected_not_fatal() {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let local = replica("local", &bus);
        local.register(10001, "Cash").unwrap();
        let mut ingestor = SyncIngestor::new(Arc::clone(&local));

        let clash = LedgerEvent::AccountRegistered(AccountRegistered {
            account: Account::new(10001, "Petty cash").unwrap(),
            occurred_at: Utc::now(),
        });

        let outcome = ingestor.handle(&envelope("peer", 7, clash)).unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Rejected(LedgerError::DuplicateCode { code: 10001 })
        );
        assert_eq!(ingestor.stats().rejected, 1);
        assert_eq!(local.snapshot().unwrap().chart().get(10001).unwrap().name, "Cash");
    }

    #[test]
    fn store_conflict_is_dropped_and_draining_continues() {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let peer = replica("peer", &bus);
        let store = Arc::new(RefusingStore::default());
        store.conflict.store(true, Ordering::SeqCst);
        let local = replica_on(Arc::clone(&store), "local", &bus);
        let sub = bus.subscribe();
        let mut ingestor = SyncIngestor::new(Arc::clone(&local));

        sell(&peer);
        peer.register(60001, "Rent").unwrap();

        assert_eq!(ingestor.drain(&sub).unwrap(), 4);
        assert!(!ingestor.has_pending());
        assert_eq!(ingestor.stats().applied, 3);
        assert_eq!(ingestor.stats().rejected, 1);

        let ledger = local.snapshot().unwrap();
        assert_eq!(ledger.chart().len(), 3);
        assert!(ledger.journal().is_empty());
    }

    #[test]
    fn transient_store_failure_is_parked_and_retried() {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let peer = replica("peer", &bus);
        let store = Arc::new(RefusingStore::default());
        store.offline.store(true, Ordering::SeqCst);
        let local = replica_on(Arc::clone(&store), "local", &bus);
        let sub = bus.subscribe();
        let mut ingestor = SyncIngestor::new(Arc::clone(&local));

        sell(&peer);

        let err = ingestor.drain(&sub).unwrap_err();
        assert!(err.is_retryable());
        assert!(ingestor.has_pending());
        assert_eq!(ingestor.stats().applied, 2);

        store.offline.store(false, Ordering::SeqCst);
        assert_eq!(ingestor.drain(&sub).unwrap(), 1);
        assert!(!ingestor.has_pending());
        assert_eq!(ingestor.stats().applied, 3);
        assert_eq!(
            local.balances().unwrap().balance_of(10001),
            Some(Decimal::new(80, 0))
        );
    }
}
