use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope for an event, carrying origin + ordering metadata.
///
/// Notes:
/// - `source` names the ledger instance that committed the event; a peer uses it
///   to drop echoes of its own writes.
/// - `sequence_number` is monotonically increasing per source.
/// - `payload` is the domain event itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    source: String,

    /// Monotonically increasing position in the source's stream.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        source: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            source: source.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_exposes_metadata_and_payload() {
        let id = Uuid::now_v7();
        let env = EventEnvelope::new(id, "laptop", 3, "payload");

        assert_eq!(env.event_id(), id);
        assert_eq!(env.source(), "laptop");
        assert_eq!(env.sequence_number(), 3);
        assert_eq!(*env.payload(), "payload");
        assert_eq!(env.into_payload(), "payload");
    }
}
