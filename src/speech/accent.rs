//! Accent transformation
//!
//! Two passes shape a reply toward an accent profile. The text pass runs on
//! the raw string before G2P and applies contractions, TH-changes, and
//! regional word swaps; each match is taken with probability proportional to
//! the accent intensity, one random draw per match, so repeated replies do
//! not all mutate identically. That variability is a product behavior, not a
//! reproducibility bug; the random source is injectable so tests can script
//! the draws. The phoneme pass is fully deterministic: symbol substitutions
//! where the profile defines a mapping, then fixed duration/gain multipliers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::prosody::PhonemeUnit;

/// Source of uniform random draws in `[0, 1)`
///
/// Production uses [`ThreadRandom`]; tests use [`ScriptedRandom`] to make
/// the text pass deterministic.
pub trait RandomSource: Send {
    /// Next uniform draw in `[0, 1)`
    fn roll(&mut self) -> f32;
}

/// Entropy-seeded random source for production use
pub struct ThreadRandom(StdRng);

impl ThreadRandom {
    /// Create a source seeded from OS entropy
    #[must_use]
    pub fn new() -> Self {
        Self(StdRng::from_entropy())
    }
}

impl Default for ThreadRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for ThreadRandom {
    fn roll(&mut self) -> f32 {
        self.0.gen_range(0.0..1.0)
    }
}

/// Replays a fixed script of draws; cycles when exhausted
pub struct ScriptedRandom {
    draws: Vec<f32>,
    next: usize,
}

impl ScriptedRandom {
    /// Create a source that replays `draws` in order
    #[must_use]
    pub const fn new(draws: Vec<f32>) -> Self {
        Self { draws, next: 0 }
    }
}

impl RandomSource for ScriptedRandom {
    fn roll(&mut self) -> f32 {
        if self.draws.is_empty() {
            return 0.0;
        }
        let v = self.draws[self.next % self.draws.len()];
        self.next += 1;
        v
    }
}

/// A text-level rewrite applied before grapheme-to-phoneme conversion
#[derive(Debug, Clone, Copy)]
pub struct TextRule {
    /// Lowercase phrase to find
    pub pattern: &'static str,
    /// Replacement text
    pub replacement: &'static str,
}

/// An accent: phoneme substitutions, timing/gain multipliers, text rules
#[derive(Debug, Clone, Copy)]
pub struct AccentProfile {
    /// Profile identifier (e.g. `uk_rp`)
    pub name: &'static str,
    /// Vowel symbol substitutions
    pub vowel_subs: &'static [(&'static str, &'static str)],
    /// Consonant symbol substitutions
    pub consonant_subs: &'static [(&'static str, &'static str)],
    /// Duration multiplier for speech units
    pub duration_scale: f32,
    /// Gain multiplier for speech units
    pub gain_scale: f32,
    /// Probabilistic text rewrites applied upstream
    pub text_rules: &'static [TextRule],
}

/// Pass-through profile: no substitutions, unity scaling
const NEUTRAL: AccentProfile = AccentProfile {
    name: "neutral",
    vowel_subs: &[],
    consonant_subs: &[],
    duration_scale: 1.0,
    gain_scale: 1.0,
    text_rules: &[],
};

/// Received Pronunciation: trap-bath broadening, non-rhotic vowel centering,
/// slightly longer and softer vowels
const UK_RP: AccentProfile = AccentProfile {
    name: "uk_rp",
    vowel_subs: &[("ae", "aa"), ("er", "ah"), ("aa", "ao")],
    consonant_subs: &[],
    duration_scale: 1.08,
    gain_scale: 0.95,
    text_rules: &[
        TextRule { pattern: "awesome", replacement: "brilliant" },
        TextRule { pattern: "elevator", replacement: "lift" },
        TextRule { pattern: "apartment", replacement: "flat" },
    ],
};

/// Southern US: price monophthongization, drawled timing, g-dropping
const US_SOUTHERN: AccentProfile = AccentProfile {
    name: "us_southern",
    vowel_subs: &[("ay", "aa"), ("eh", "ae"), ("iy", "ih")],
    consonant_subs: &[("ng", "n")],
    duration_scale: 1.15,
    gain_scale: 1.0,
    text_rules: &[
        TextRule { pattern: "you all", replacement: "y'all" },
        TextRule { pattern: "going to", replacement: "gonna" },
        TextRule { pattern: "them", replacement: "'em" },
        TextRule { pattern: "thing", replacement: "thang" },
    ],
};

/// Built-in accent profiles
const PROFILES: &[&AccentProfile] = &[&NEUTRAL, &UK_RP, &US_SOUTHERN];

impl AccentProfile {
    /// The pass-through profile
    #[must_use]
    pub const fn neutral() -> &'static Self {
        &NEUTRAL
    }

    /// Look up a built-in profile by name
    #[must_use]
    pub fn by_name(name: &str) -> Option<&'static Self> {
        PROFILES.iter().find(|p| p.name == name).copied()
    }

    /// Names of all built-in profiles
    #[must_use]
    pub fn names() -> Vec<&'static str> {
        PROFILES.iter().map(|p| p.name).collect()
    }

    /// Substitution for a phoneme symbol, if this profile defines one
    #[must_use]
    pub fn substitute(&self, symbol: &str) -> Option<&'static str> {
        self.vowel_subs
            .iter()
            .chain(self.consonant_subs)
            .find(|(from, _)| *from == symbol)
            .map(|(_, to)| *to)
    }
}

/// Apply the probabilistic text pass
///
/// Each occurrence of a rule pattern is replaced with probability
/// `intensity` (clamped to `[0, 1]`), one draw per match. Matching is
/// case-insensitive; replacements are inserted as written in the rule.
pub fn apply_text_accent(
    text: &str,
    profile: &AccentProfile,
    intensity: f32,
    rng: &mut dyn RandomSource,
) -> String {
    let intensity = intensity.clamp(0.0, 1.0);
    if intensity == 0.0 || profile.text_rules.is_empty() {
        return text.to_string();
    }

    let mut out = text.to_string();
    for rule in profile.text_rules {
        let mut rebuilt = String::with_capacity(out.len());
        let mut cursor = 0;
        // ASCII lowering keeps byte offsets aligned with the original text
        let lower = out.to_ascii_lowercase();

        for (start, _) in lower.match_indices(rule.pattern) {
            if start < cursor {
                continue;
            }
            rebuilt.push_str(&out[cursor..start]);
            if rng.roll() < intensity {
                rebuilt.push_str(rule.replacement);
            } else {
                rebuilt.push_str(&out[start..start + rule.pattern.len()]);
            }
            cursor = start + rule.pattern.len();
        }

        rebuilt.push_str(&out[cursor..]);
        out = rebuilt;
    }

    out
}

/// Apply the deterministic phoneme pass in place
///
/// Substitutes symbols where the profile defines a mapping, then scales
/// duration and gain of every speech unit by the profile's multipliers.
/// Pause units keep their timing; boundary-driven pause lengths are a
/// prosody decision, not an accent one.
pub fn accentize(units: &mut [PhonemeUnit], profile: &AccentProfile) {
    for unit in units.iter_mut() {
        if unit.is_pause() {
            continue;
        }

        if let Some(replacement) = profile.substitute(&unit.symbol) {
            unit.symbol = replacement.to_string();
        }

        unit.duration *= profile.duration_scale;
        unit.gain *= profile.gain_scale;
    }

    tracing::trace!(profile = profile.name, units = units.len(), "accent applied");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::prosody::ProsodyPlanner;

    // -- profiles -------------------------------------------------------------

    #[test]
    fn builtin_profiles_resolve_by_name() {
        assert_eq!(AccentProfile::by_name("uk_rp").unwrap().name, "uk_rp");
        assert_eq!(AccentProfile::by_name("neutral").unwrap().name, "neutral");
        assert!(AccentProfile::by_name("martian").is_none());
    }

    // -- phoneme pass ---------------------------------------------------------

    #[test]
    fn uk_rp_scales_mapped_vowel_exactly() {
        let profile = AccentProfile::by_name("uk_rp").unwrap();
        let mut units = ProsodyPlanner::new().plan("cat");
        let before = units
            .iter()
            .find(|u| u.symbol == "ae")
            .cloned()
            .expect("'cat' contains ae");

        accentize(&mut units, profile);

        let after = units.iter().find(|u| u.symbol == "aa").expect("ae mapped to aa");
        assert!((after.duration - before.duration * profile.duration_scale).abs() < 1e-6);
        assert!((after.gain - before.gain * profile.gain_scale).abs() < 1e-6);
    }

    #[test]
    fn unmapped_symbols_keep_their_identity() {
        let profile = AccentProfile::by_name("uk_rp").unwrap();
        let mut units = ProsodyPlanner::new().plan("sip");

        accentize(&mut units, profile);

        // "s", "ih", "p" have no uk_rp mapping; only scaling applies
        assert!(units.iter().any(|u| u.symbol == "ih"));
        assert!(units.iter().any(|u| u.symbol == "s"));
    }

    #[test]
    fn neutral_profile_is_identity() {
        let mut units = ProsodyPlanner::new().plan("hello world");
        let original = units.clone();

        accentize(&mut units, AccentProfile::neutral());
        assert_eq!(units, original);
    }

    #[test]
    fn pauses_are_not_scaled() {
        let profile = AccentProfile::by_name("us_southern").unwrap();
        let mut units = ProsodyPlanner::new().plan("hello world");
        let pause_before: Vec<f32> = units
            .iter()
            .filter(|u| u.is_pause())
            .map(|u| u.duration)
            .collect();

        accentize(&mut units, profile);

        let pause_after: Vec<f32> = units
            .iter()
            .filter(|u| u.is_pause())
            .map(|u| u.duration)
            .collect();
        assert_eq!(pause_before, pause_after);
    }

    // -- text pass ------------------------------------------------------------

    #[test]
    fn full_intensity_applies_every_rule() {
        let profile = AccentProfile::by_name("us_southern").unwrap();
        let mut rng = ScriptedRandom::new(vec![0.0]);

        let out = apply_text_accent("I am going to call you all", profile, 1.0, &mut rng);
        assert_eq!(out, "I am gonna call y'all");
    }

    #[test]
    fn zero_intensity_is_identity_without_draws() {
        let profile = AccentProfile::by_name("us_southern").unwrap();
        let mut rng = ScriptedRandom::new(vec![0.0]);

        let input = "going to see you all";
        assert_eq!(apply_text_accent(input, profile, 0.0, &mut rng), input);
    }

    #[test]
    fn each_match_draws_independently() {
        let profile = AccentProfile::by_name("us_southern").unwrap();
        // First match accepted, second rejected at intensity 0.5
        let mut rng = ScriptedRandom::new(vec![0.1, 0.9]);

        let out = apply_text_accent("them and them", profile, 0.5, &mut rng);
        assert_eq!(out, "'em and them");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let profile = AccentProfile::by_name("uk_rp").unwrap();
        let mut rng = ScriptedRandom::new(vec![0.0]);

        let out = apply_text_accent("That is Awesome", profile, 1.0, &mut rng);
        assert_eq!(out, "That is brilliant");
    }
}
