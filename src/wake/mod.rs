//! Wake-word matching and speaker verification
//!
//! Two decisions share the same MFCC primitive: wake-word matching aligns a
//! live feature sequence against enrolled templates with DTW, and speaker
//! verification compares mean voiceprints with cosine similarity. The
//! verification threshold is deliberately higher than the wake threshold;
//! a false accept there gates command execution, not just attention.

pub mod dtw;
pub mod enroll;

pub use enroll::Enroller;

use crate::dsp::{cosine, resample_coefficients};
use crate::{Error, Result};

/// Configuration for wake-word matching and speaker verification
#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    /// DTW similarity at or above which a wake template matches
    pub wake_threshold: f32,
    /// Cosine similarity at or above which a speaker is accepted
    pub verify_threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            wake_threshold: 0.65,
            verify_threshold: 0.82,
        }
    }
}

/// One enrolled wake-word utterance
#[derive(Debug, Clone)]
pub struct Template {
    /// Keyword this utterance enrolls
    pub keyword: String,
    /// Ordered per-frame feature vectors
    pub frames: Vec<Vec<f32>>,
}

/// Outcome of a wake-word match
#[derive(Debug, Clone, PartialEq)]
pub struct WakeMatch {
    /// Keyword of the winning template
    pub keyword: String,
    /// DTW similarity of the winning template
    pub similarity: f32,
}

/// Matches live feature sequences against enrolled wake-word templates
///
/// Templates are kept in registration order; on an exact similarity tie the
/// first registered template wins (strict `>` comparison), so the tie-break
/// never depends on container iteration order.
pub struct WakeWordMatcher {
    config: MatcherConfig,
    templates: Vec<Template>,
}

impl WakeWordMatcher {
    /// Create a matcher with no templates registered
    #[must_use]
    pub const fn new(config: MatcherConfig) -> Self {
        Self {
            config,
            templates: Vec::new(),
        }
    }

    /// Number of registered templates
    #[must_use]
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Register an enrolled utterance for a keyword
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] for an empty frame sequence.
    pub fn register(&mut self, keyword: &str, frames: Vec<Vec<f32>>) -> Result<()> {
        if frames.is_empty() {
            return Err(Error::EmptyInput("template has no frames"));
        }

        tracing::debug!(keyword, frames = frames.len(), "wake template registered");
        self.templates.push(Template {
            keyword: keyword.to_lowercase().trim().to_string(),
            frames,
        });
        Ok(())
    }

    /// Atomically replace every template for `keyword` with a new set
    ///
    /// The swap happens only after all replacements validate, so a bad
    /// enrollment never leaves a half-written template set behind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] if the set or any utterance is empty.
    pub fn replace(&mut self, keyword: &str, utterances: Vec<Vec<Vec<f32>>>) -> Result<()> {
        if utterances.is_empty() || utterances.iter().any(Vec::is_empty) {
            return Err(Error::EmptyInput("replacement template set is empty"));
        }

        let keyword = keyword.to_lowercase().trim().to_string();
        self.templates.retain(|t| t.keyword != keyword);
        for frames in utterances {
            self.templates.push(Template {
                keyword: keyword.clone(),
                frames,
            });
        }

        tracing::debug!(keyword, "wake templates replaced");
        Ok(())
    }

    /// Score a live sequence against every template and return the best
    /// accepted match, if any
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] when the live sequence is empty or no
    /// template has been registered.
    pub fn best_match(&self, live: &[Vec<f32>]) -> Result<Option<WakeMatch>> {
        if self.templates.is_empty() {
            return Err(Error::EmptyInput("no wake templates registered"));
        }

        let mut best: Option<(usize, f32)> = None;
        for (i, template) in self.templates.iter().enumerate() {
            let cost = dtw::alignment_cost(live, &template.frames)?;
            let sim = dtw::similarity(cost);

            // Strict > keeps the earliest registered template on exact ties
            if best.is_none_or(|(_, s)| sim > s) {
                best = Some((i, sim));
            }
        }

        let (index, similarity) = best.expect("at least one template scored");
        if similarity >= self.config.wake_threshold {
            let keyword = self.templates[index].keyword.clone();
            tracing::debug!(keyword, similarity, "wake word matched");
            Ok(Some(WakeMatch { keyword, similarity }))
        } else {
            tracing::trace!(similarity, "below wake threshold");
            Ok(None)
        }
    }
}

/// Outcome of a speaker verification check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifyDecision {
    /// Cosine similarity against the enrolled voiceprint
    pub score: f32,
    /// Whether the score cleared the verification threshold
    pub accepted: bool,
}

/// Verifies a live voiceprint against the enrolled speaker
pub struct SpeakerVerifier {
    config: MatcherConfig,
    enrolled: Option<Vec<f32>>,
}

impl SpeakerVerifier {
    /// Create a verifier with no enrolled voiceprint
    #[must_use]
    pub const fn new(config: MatcherConfig) -> Self {
        Self {
            config,
            enrolled: None,
        }
    }

    /// True once a voiceprint has been enrolled
    #[must_use]
    pub const fn is_enrolled(&self) -> bool {
        self.enrolled.is_some()
    }

    /// Atomically replace the enrolled voiceprint
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] for an empty coefficient vector.
    pub fn enroll(&mut self, voiceprint: Vec<f32>) -> Result<()> {
        if voiceprint.is_empty() {
            return Err(Error::EmptyInput("voiceprint has no coefficients"));
        }

        tracing::debug!(coefficients = voiceprint.len(), "voiceprint enrolled");
        self.enrolled = Some(voiceprint);
        Ok(())
    }

    /// Drop the enrolled voiceprint
    pub fn clear(&mut self) {
        self.enrolled = None;
    }

    /// Compare a live mean voiceprint against the enrolled one
    ///
    /// A live vector extracted at a different coefficient count is resampled
    /// to the enrolled count before scoring.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] when nothing is enrolled or the live
    /// vector is empty.
    pub fn verify(&self, live: &[f32]) -> Result<VerifyDecision> {
        let enrolled = self
            .enrolled
            .as_ref()
            .ok_or(Error::EmptyInput("no voiceprint enrolled"))?;
        if live.is_empty() {
            return Err(Error::EmptyInput("live voiceprint is empty"));
        }

        let score = if live.len() == enrolled.len() {
            cosine(live, enrolled)
        } else {
            let resampled = resample_coefficients(live, enrolled.len());
            cosine(&resampled, enrolled)
        };

        let accepted = score >= self.config.verify_threshold;
        tracing::debug!(score, accepted, "speaker verification");
        Ok(VerifyDecision { score, accepted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(seed: f32, frames: usize) -> Vec<Vec<f32>> {
        (0..frames)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f32;
                vec![seed * t.sin(), seed * 0.5, t * 0.1]
            })
            .collect()
    }

    // -- wake matching --------------------------------------------------------

    #[test]
    fn exact_template_replay_matches() {
        let mut matcher = WakeWordMatcher::new(MatcherConfig::default());
        let frames = pattern(1.0, 12);
        matcher.register("hey cadence", frames.clone()).unwrap();

        let m = matcher.best_match(&frames).unwrap().expect("should match");
        assert_eq!(m.keyword, "hey cadence");
        assert!(m.similarity >= 0.99);
    }

    #[test]
    fn no_templates_is_an_error() {
        let matcher = WakeWordMatcher::new(MatcherConfig::default());
        assert!(matches!(
            matcher.best_match(&pattern(1.0, 5)),
            Err(Error::EmptyInput(_))
        ));
    }

    #[test]
    fn empty_template_rejected_at_registration() {
        let mut matcher = WakeWordMatcher::new(MatcherConfig::default());
        assert!(matches!(
            matcher.register("hey", Vec::new()),
            Err(Error::EmptyInput(_))
        ));
    }

    #[test]
    fn first_registered_template_wins_ties() {
        let mut matcher = WakeWordMatcher::new(MatcherConfig::default());
        let frames = pattern(1.0, 8);
        matcher.register("first", frames.clone()).unwrap();
        matcher.register("second", frames.clone()).unwrap();

        let m = matcher.best_match(&frames).unwrap().expect("should match");
        assert_eq!(m.keyword, "first");
    }

    #[test]
    fn dissimilar_live_sequence_is_rejected() {
        let mut matcher = WakeWordMatcher::new(MatcherConfig::default());
        matcher.register("hey cadence", pattern(1.0, 12)).unwrap();

        let noise = pattern(40.0, 12);
        assert_eq!(matcher.best_match(&noise).unwrap(), None);
    }

    #[test]
    fn replace_is_atomic_on_bad_input() {
        let mut matcher = WakeWordMatcher::new(MatcherConfig::default());
        matcher.register("hey", pattern(1.0, 8)).unwrap();

        // One empty utterance poisons the whole replacement
        let result = matcher.replace("hey", vec![pattern(2.0, 8), Vec::new()]);
        assert!(result.is_err());
        assert_eq!(matcher.template_count(), 1);

        // The original template still matches
        assert!(matcher.best_match(&pattern(1.0, 8)).unwrap().is_some());
    }

    // -- speaker verification -------------------------------------------------

    #[test]
    fn enrolled_speaker_verifies_against_self() {
        let mut verifier = SpeakerVerifier::new(MatcherConfig::default());
        let print = vec![1.2, -0.4, 0.9, 0.1, -2.0];
        verifier.enroll(print.clone()).unwrap();

        let decision = verifier.verify(&print).unwrap();
        assert!(decision.accepted);
        assert!((decision.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn verify_without_enrollment_fails() {
        let verifier = SpeakerVerifier::new(MatcherConfig::default());
        assert!(matches!(
            verifier.verify(&[1.0, 2.0]),
            Err(Error::EmptyInput(_))
        ));
    }

    #[test]
    fn mismatched_coefficient_counts_are_resampled() {
        let mut verifier = SpeakerVerifier::new(MatcherConfig::default());
        verifier.enroll(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();

        // Same shape at half resolution still verifies well
        let decision = verifier.verify(&[1.0, 3.0, 5.0]).unwrap();
        assert!(decision.score > 0.9);
    }

    #[test]
    fn different_speaker_is_rejected() {
        let mut verifier = SpeakerVerifier::new(MatcherConfig::default());
        verifier.enroll(vec![1.0, 0.0, 0.0, 1.0]).unwrap();

        let decision = verifier.verify(&[-1.0, 0.5, 2.0, -1.0]).unwrap();
        assert!(!decision.accepted);
    }
}
