//! Duplex guard between capture and playback
//!
//! The pipeline must never act on a transcription of its own voice. The turn
//! state machine arbitrates: while synthesis is speaking, every incoming
//! recognized text is rejected; in any state, a text identical to the last
//! accepted (or last spoken) utterance is rejected as a recognizer re-emit.
//! The dedup is exact string match only; near-duplicate phrasings pass.
//!
//! The machine also owns the synthesis busy heartbeat: state and heartbeat
//! flip under the same lock, so supervisor hang detection can never observe
//! "cancelled" and "still busy" at once.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::supervisor::Heartbeats;

/// Whether the pipeline is currently producing speech
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechState {
    /// Listening; recognized text may be acted on
    Idle,
    /// Synthesizing; all incoming text is rejected
    Speaking,
}

struct Inner {
    state: SpeechState,
    last_utterance: Option<String>,
    last_change: Instant,
}

/// Process-wide speech state; one instance per pipeline
pub struct TurnStateMachine {
    inner: Mutex<Inner>,
    heartbeats: Arc<Heartbeats>,
}

impl TurnStateMachine {
    /// Create the guard over the shared heartbeat registry
    #[must_use]
    pub fn new(heartbeats: Arc<Heartbeats>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SpeechState::Idle,
                last_utterance: None,
                last_change: Instant::now(),
            }),
            heartbeats,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SpeechState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// The last utterance accepted or spoken, if any
    #[must_use]
    pub fn last_utterance(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_utterance
            .clone()
    }

    /// Time since the last state change
    #[must_use]
    pub fn since_last_change(&self) -> std::time::Duration {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_change
            .elapsed()
    }

    /// Synthesis is starting to speak `utterance`
    ///
    /// Records the spoken text so a recognizer that hears our own output
    /// right after we finish gets deduplicated too.
    pub fn begin_speaking(&self, utterance: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state = SpeechState::Speaking;
        inner.last_utterance = Some(utterance.to_string());
        inner.last_change = Instant::now();
        self.heartbeats.set_synthesis_busy(true);
        tracing::debug!("speech state: speaking");
    }

    /// Synthesis finished normally
    pub fn end_speaking(&self) {
        self.to_idle("speech state: idle");
    }

    /// Synthesis was cancelled (by the user or the supervisor)
    ///
    /// Identical to [`Self::end_speaking`] at the state level; logged apart
    /// so recoveries are visible in traces.
    pub fn cancel_speaking(&self) {
        self.to_idle("speech state: idle (cancelled)");
    }

    fn to_idle(&self, message: &'static str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state = SpeechState::Idle;
        inner.last_change = Instant::now();
        // Busy flag clears under the same lock as the state flip
        self.heartbeats.set_synthesis_busy(false);
        tracing::debug!("{message}");
    }

    /// Decide whether incoming recognized text may be acted on
    ///
    /// Returns `false` while speaking, and `false` for an exact repeat of
    /// the last accepted utterance. An accepted text becomes the new dedup
    /// reference.
    pub fn guard_incoming(&self, text: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.state == SpeechState::Speaking {
            tracing::trace!("incoming text rejected: currently speaking");
            return false;
        }

        if inner.last_utterance.as_deref() == Some(text) {
            tracing::debug!("incoming text rejected: duplicate utterance");
            return false;
        }

        inner.last_utterance = Some(text.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> TurnStateMachine {
        TurnStateMachine::new(Arc::new(Heartbeats::new()))
    }

    #[test]
    fn starts_idle() {
        assert_eq!(machine().state(), SpeechState::Idle);
    }

    #[test]
    fn rejects_everything_while_speaking() {
        let m = machine();
        m.begin_speaking("the weather is sunny");

        assert!(!m.guard_incoming("turn on the lights"));
        assert!(!m.guard_incoming("anything at all"));
        assert_eq!(m.state(), SpeechState::Speaking);
    }

    #[test]
    fn accepts_new_text_after_idle() {
        let m = machine();
        m.begin_speaking("the weather is sunny");
        m.end_speaking();

        assert!(m.guard_incoming("turn on the lights"));
    }

    #[test]
    fn rejects_echo_of_own_output() {
        let m = machine();
        m.begin_speaking("the weather is sunny");
        m.end_speaking();

        // The recognizer heard our own reply
        assert!(!m.guard_incoming("the weather is sunny"));
    }

    #[test]
    fn dedupes_consecutive_identical_utterances() {
        let m = machine();

        assert!(m.guard_incoming("play music"));
        assert!(!m.guard_incoming("play music"));
        assert!(m.guard_incoming("stop music"));
        // Not consecutive anymore: accepted again
        assert!(m.guard_incoming("play music"));
    }

    #[test]
    fn near_duplicates_pass() {
        let m = machine();
        assert!(m.guard_incoming("play music"));
        assert!(m.guard_incoming("play music please"));
    }

    #[test]
    fn busy_heartbeat_follows_state() {
        let hb = Arc::new(Heartbeats::new());
        let m = TurnStateMachine::new(Arc::clone(&hb));

        m.begin_speaking("hello");
        assert!(hb.synthesis_busy_for().is_some());

        m.cancel_speaking();
        assert_eq!(hb.synthesis_busy_for(), None);
        assert_eq!(m.state(), SpeechState::Idle);
    }
}
