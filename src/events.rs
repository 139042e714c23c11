//! Typed event fan-out for UI and telemetry layers
//!
//! Components publish onto an explicitly owned [`EventBus`] that is handed
//! to them at construction; there is no global registry. Delivery is
//! synchronous and ordered within one publish call, so subscribers observe
//! every event exactly once and in the order it was published. Subscribers
//! must be cheap; slow work belongs on the subscriber's own channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::speech::prosody::PhonemeUnit;
use crate::supervisor::{DiagnosticsSink, SupervisorSignal};
use crate::turn::SpeechState;

/// Everything the pipeline announces to the outside
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The VAD opened a speech segment
    SpeechStarted {
        /// Stream time of the trigger
        at: Duration,
        /// Trigger score
        score: f32,
    },
    /// The VAD closed a speech segment
    SpeechStopped {
        /// Stream time of the trigger
        at: Duration,
        /// Trigger score
        score: f32,
    },
    /// A wake template matched the live audio
    WakeDetected {
        /// Matched keyword
        keyword: String,
        /// DTW similarity
        similarity: f32,
    },
    /// A speaker verification decision was made
    SpeakerVerified {
        /// Cosine score against the enrolled voiceprint
        score: f32,
        /// Whether the speaker was accepted
        accepted: bool,
    },
    /// Recognized text passed the duplex guard
    TranscriptAccepted {
        /// The accepted text
        text: String,
    },
    /// Recognized text was rejected (speaking, or a duplicate)
    TranscriptRejected {
        /// The rejected text
        text: String,
    },
    /// The turn state machine changed state
    StateChanged {
        /// New state
        state: SpeechState,
    },
    /// A phoneme timeline is about to be synthesized (for visualization)
    PhonemeTimeline {
        /// The planned units
        units: Vec<PhonemeUnit>,
    },
    /// A supervisor anomaly or recovery
    Supervisor {
        /// The forwarded signal
        signal: SupervisorSignal,
    },
}

type Subscriber = Box<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Publish/subscribe bus with ordered synchronous delivery
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; it stays registered for the bus lifetime
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(subscriber));
    }

    /// Number of registered subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Deliver one event to every subscriber, in subscription order
    pub fn publish(&self, event: &PipelineEvent) {
        let subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        for subscriber in subscribers.iter() {
            subscriber(event);
        }
    }
}

/// Adapter that forwards supervisor signals onto the event bus
///
/// Lets UI/telemetry subscribers see anomalies and recoveries through the
/// same bus as every other pipeline event.
pub struct BusDiagnostics {
    bus: Arc<EventBus>,
}

impl BusDiagnostics {
    /// Forward signals onto `bus`
    #[must_use]
    pub const fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl DiagnosticsSink for BusDiagnostics {
    fn emit(&self, signal: SupervisorSignal) {
        self.bus.publish(&PipelineEvent::Supervisor { signal });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn delivery_is_ordered_per_subscriber() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe(move |event| {
            if let PipelineEvent::TranscriptAccepted { text } = event {
                sink.lock().unwrap().push(text.clone());
            }
        });

        for text in ["one", "two", "three"] {
            bus.publish(&PipelineEvent::TranscriptAccepted { text: text.to_string() });
        }

        assert_eq!(*seen.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[test]
    fn every_subscriber_sees_every_event() {
        let bus = EventBus::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        bus.subscribe(move |_| {
            f.fetch_add(1, Ordering::Relaxed);
        });
        let s = Arc::clone(&second);
        bus.subscribe(move |_| {
            s.fetch_add(1, Ordering::Relaxed);
        });

        bus.publish(&PipelineEvent::StateChanged { state: SpeechState::Idle });
        bus.publish(&PipelineEvent::StateChanged { state: SpeechState::Speaking });

        assert_eq!(first.load(Ordering::Relaxed), 2);
        assert_eq!(second.load(Ordering::Relaxed), 2);
        assert_eq!(bus.subscriber_count(), 2);
    }
}
