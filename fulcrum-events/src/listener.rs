//! The two listener seams: raw domain events flow between internal
//! decorators (translator, router), canonical envelopes are what a
//! caller-supplied sink actually receives.

use async_trait::async_trait;
use fulcrum_core::Event;

use crate::envelope::EventEnvelope;

/// A sink for canonical wire envelopes — what a CLI, chat gateway, or
/// SSE endpoint actually implements.
#[async_trait]
pub trait EnvelopeListener: Send + Sync {
    /// Deliver one envelope.
    async fn on_envelope(&self, envelope: EventEnvelope);
}

/// A sink for raw domain events — the interface internal decorators
/// (the translator, the router, a coordinator-level title recorder)
/// compose against before anything reaches an [`EnvelopeListener`].
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Deliver one raw domain event.
    async fn on_event(&self, event: Event);
}

#[async_trait]
impl<F> EnvelopeListener for F
where
    F: Fn(EventEnvelope) + Send + Sync,
{
    async fn on_envelope(&self, envelope: EventEnvelope) {
        (self)(envelope)
    }
}
