//! Prosody planning and grapheme-to-phoneme conversion
//!
//! Turns reply text into a timed phoneme sequence: phrases are split on
//! terminal punctuation, words get boundary tags (rising for questions,
//! falling otherwise, an intermediate break every third word), and each word
//! runs through a small dictionary-first G2P pass. Unknown spellings degrade
//! to a neutral schwa instead of failing; the synthesizer must always have
//! something to say.

/// Phrase-boundary tag carried by each phoneme unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// No boundary
    None,
    /// Minor break inside a phrase
    IntermediatePhrase,
    /// Phrase-final falling contour
    LowEnd,
    /// Phrase-final rising contour (questions)
    HighEnd,
}

impl Boundary {
    /// Pause length multiplier for this boundary strength
    #[must_use]
    pub const fn pause_secs(self) -> f32 {
        match self {
            Self::None => 0.04,
            Self::IntermediatePhrase => 0.12,
            Self::LowEnd | Self::HighEnd => 0.25,
        }
    }
}

/// Broad articulation class of a phoneme, used for timing and synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhonemeClass {
    /// Open vocal tract, voiced
    Vowel,
    /// Liquids, glides, and nasals
    LiquidNasal,
    /// Turbulent noise, sustained
    Fricative,
    /// Stop consonants and affricates
    Plosive,
    /// Silence
    Pause,
}

/// Symbol used for pause units and as the unknown-spelling fallback vowel
pub const SCHWA: &str = "ah";

/// Symbol used for pause units
pub const PAUSE: &str = "pau";

/// One schedulable unit of synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct PhonemeUnit {
    /// Phoneme symbol (ARPAbet-ish, lowercase)
    pub symbol: String,
    /// Target duration in seconds
    pub duration: f32,
    /// Linear gain
    pub gain: f32,
    /// Boundary tag inherited from the word
    pub boundary: Boundary,
    /// Word carried emphasis (all-caps in the input)
    pub emphasis: bool,
}

impl PhonemeUnit {
    /// True for silence units that only advance the clock
    #[must_use]
    pub fn is_pause(&self) -> bool {
        self.symbol == PAUSE
    }

    /// Articulation class of this unit's symbol
    #[must_use]
    pub fn class(&self) -> PhonemeClass {
        classify(&self.symbol)
    }
}

/// Classify a phoneme symbol
#[must_use]
pub fn classify(symbol: &str) -> PhonemeClass {
    match symbol {
        PAUSE => PhonemeClass::Pause,
        "aa" | "ae" | "ah" | "ao" | "aw" | "ay" | "eh" | "er" | "ey" | "ih" | "iy" | "ow"
        | "oy" | "uh" | "uw" => PhonemeClass::Vowel,
        "l" | "r" | "w" | "y" | "m" | "n" | "ng" => PhonemeClass::LiquidNasal,
        "f" | "v" | "s" | "z" | "sh" | "zh" | "th" | "dh" | "hh" => PhonemeClass::Fricative,
        _ => PhonemeClass::Plosive,
    }
}

/// Base duration in seconds for a phoneme class
const fn class_duration(class: PhonemeClass) -> f32 {
    match class {
        PhonemeClass::Vowel => 0.14,
        PhonemeClass::LiquidNasal => 0.10,
        PhonemeClass::Fricative => 0.09,
        PhonemeClass::Plosive => 0.06,
        PhonemeClass::Pause => 0.04,
    }
}

/// Duration multiplier for emphasized words
const EMPHASIS_DURATION: f32 = 1.3;

/// Gain multiplier for emphasized words
const EMPHASIS_GAIN: f32 = 1.25;

/// Exact-spelling pronunciations checked before the rule pass
const DICTIONARY: &[(&str, &[&str])] = &[
    ("a", &["ah"]),
    ("are", &["aa", "r"]),
    ("cadence", &["k", "ey", "d", "ah", "n", "s"]),
    ("computer", &["k", "ah", "m", "p", "y", "uw", "t", "er"]),
    ("goodbye", &["g", "uh", "d", "b", "ay"]),
    ("hello", &["hh", "eh", "l", "ow"]),
    ("hey", &["hh", "ey"]),
    ("i", &["ay"]),
    ("is", &["ih", "z"]),
    ("okay", &["ow", "k", "ey"]),
    ("one", &["w", "ah", "n"]),
    ("the", &["dh", "ah"]),
    ("they", &["dh", "ey"]),
    ("time", &["t", "ay", "m"]),
    ("to", &["t", "uw"]),
    ("two", &["t", "uw"]),
    ("was", &["w", "ah", "z"]),
    ("what", &["w", "ah", "t"]),
    ("world", &["w", "er", "l", "d"]),
    ("yes", &["y", "eh", "s"]),
    ("you", &["y", "uw"]),
];

/// Two-letter consonant digraphs recognized by the rule pass
const DIGRAPHS: &[(&str, &[&str])] = &[
    ("ch", &["ch"]),
    ("sh", &["sh"]),
    ("th", &["th"]),
    ("ph", &["f"]),
    ("ng", &["ng"]),
    ("zh", &["zh"]),
];

/// Two-letter vowel pairs recognized by the rule pass
const VOWEL_PAIRS: &[(&str, &[&str])] = &[
    ("ai", &["ey"]),
    ("ay", &["ey"]),
    ("ee", &["iy"]),
    ("ea", &["iy"]),
    ("oo", &["uw"]),
    ("ou", &["aw"]),
    ("ow", &["aw"]),
    ("oy", &["oy"]),
    ("ar", &["aa", "r"]),
    ("er", &["er"]),
    ("ir", &["er"]),
    ("or", &["ao", "r"]),
    ("ur", &["er"]),
];

/// Single-letter fallback map
const fn letter_phoneme(c: char) -> Option<&'static str> {
    Some(match c {
        'a' => "ae",
        'b' => "b",
        'c' | 'k' | 'q' => "k",
        'd' => "d",
        'e' => "eh",
        'f' => "f",
        'g' => "g",
        'h' => "hh",
        'i' => "ih",
        'j' => "jh",
        'l' => "l",
        'm' => "m",
        'n' => "n",
        'o' => "aa",
        'p' => "p",
        'r' => "r",
        's' => "s",
        't' => "t",
        'u' => "ah",
        'v' => "v",
        'w' => "w",
        'x' => "k",
        'y' => "y",
        'z' => "z",
        _ => return None,
    })
}

/// Convert one lowercase word to phoneme symbols
///
/// Dictionary first, then digraph/vowel-pair rules, then the per-letter map.
/// A word that produces nothing (digits, symbols) becomes a single schwa.
#[must_use]
pub fn word_to_phonemes(word: &str) -> Vec<String> {
    if let Some((_, phones)) = DICTIONARY.iter().find(|(w, _)| *w == word) {
        return phones.iter().map(ToString::to_string).collect();
    }

    let chars: Vec<char> = word.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if i + 1 < chars.len() {
            let pair: String = chars[i..=i + 1].iter().collect();
            let rule = DIGRAPHS
                .iter()
                .chain(VOWEL_PAIRS)
                .find(|(p, _)| *p == pair);
            if let Some((_, phones)) = rule {
                out.extend(phones.iter().map(ToString::to_string));
                i += 2;
                continue;
            }
        }

        // "x" expands to a cluster; everything else is one symbol
        if chars[i] == 'x' {
            out.push("k".to_string());
            out.push("s".to_string());
        } else if let Some(p) = letter_phoneme(chars[i]) {
            out.push(p.to_string());
        }
        i += 1;
    }

    if out.is_empty() {
        out.push(SCHWA.to_string());
    }
    out
}

/// One phrase after text segmentation: its words and terminal punctuation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhrasePlan {
    /// Words in the phrase, original casing preserved
    pub words: Vec<String>,
    /// The punctuation that ended the phrase, if any
    pub terminal: Option<char>,
}

/// Plans phoneme timelines from reply text
#[derive(Debug, Clone, Copy, Default)]
pub struct ProsodyPlanner;

impl ProsodyPlanner {
    /// Create a planner
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Split text into phrases on terminal punctuation
    ///
    /// Commas and semicolons end a phrase just like sentence-final marks;
    /// only `?` selects the rising contour downstream.
    #[must_use]
    pub fn phrases(self, text: &str) -> Vec<PhrasePlan> {
        let mut phrases = Vec::new();
        let mut words = Vec::new();
        let mut current = String::new();

        let mut flush_word = |words: &mut Vec<String>, current: &mut String| {
            if !current.is_empty() {
                words.push(std::mem::take(current));
            }
        };

        for c in text.chars() {
            match c {
                '.' | '!' | '?' | ',' | ';' | ':' => {
                    flush_word(&mut words, &mut current);
                    if !words.is_empty() {
                        phrases.push(PhrasePlan {
                            words: std::mem::take(&mut words),
                            terminal: Some(c),
                        });
                    }
                }
                c if c.is_whitespace() => flush_word(&mut words, &mut current),
                c => current.push(c),
            }
        }

        flush_word(&mut words, &mut current);
        if !words.is_empty() {
            phrases.push(PhrasePlan {
                words,
                terminal: None,
            });
        }

        phrases
    }

    /// Boundary tag for the word at `index` in a phrase of `len` words
    fn boundary_for(index: usize, len: usize, terminal: Option<char>) -> Boundary {
        if index + 1 == len {
            if terminal == Some('?') {
                Boundary::HighEnd
            } else {
                Boundary::LowEnd
            }
        } else if index % 3 == 2 {
            Boundary::IntermediatePhrase
        } else {
            Boundary::None
        }
    }

    /// Plan a complete phoneme timeline for `text`
    #[must_use]
    pub fn plan(self, text: &str) -> Vec<PhonemeUnit> {
        let mut units = Vec::new();

        for phrase in self.phrases(text) {
            let len = phrase.words.len();
            for (index, word) in phrase.words.iter().enumerate() {
                let boundary = Self::boundary_for(index, len, phrase.terminal);
                let emphasis = word.len() > 1
                    && word.chars().any(char::is_alphabetic)
                    && word.chars().all(|c| !c.is_alphabetic() || c.is_uppercase());

                for symbol in word_to_phonemes(&word.to_lowercase()) {
                    let class = classify(&symbol);
                    let mut duration = class_duration(class);
                    let mut gain = 1.0;
                    if emphasis {
                        duration *= EMPHASIS_DURATION;
                        gain *= EMPHASIS_GAIN;
                    }

                    units.push(PhonemeUnit {
                        symbol,
                        duration,
                        gain,
                        boundary,
                        emphasis,
                    });
                }

                // Inter-word pause, widened at stronger boundaries
                units.push(PhonemeUnit {
                    symbol: PAUSE.to_string(),
                    duration: boundary.pause_secs(),
                    gain: 0.0,
                    boundary,
                    emphasis: false,
                });
            }
        }

        tracing::trace!(units = units.len(), "prosody plan built");
        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- phrase segmentation --------------------------------------------------

    #[test]
    fn hello_world_splits_into_two_phrases() {
        let planner = ProsodyPlanner::new();
        let phrases = planner.phrases("Hello, world.");

        assert_eq!(phrases.len(), 2);
        assert_eq!(phrases[0].words, vec!["Hello"]);
        assert_eq!(phrases[0].terminal, Some(','));
        assert_eq!(phrases[1].words, vec!["world"]);
        assert_eq!(phrases[1].terminal, Some('.'));
    }

    #[test]
    fn unterminated_text_still_forms_a_phrase() {
        let phrases = ProsodyPlanner::new().phrases("wait for me");
        assert_eq!(phrases.len(), 1);
        assert_eq!(phrases[0].terminal, None);
    }

    // -- boundaries -----------------------------------------------------------

    #[test]
    fn statement_final_word_gets_low_end() {
        let units = ProsodyPlanner::new().plan("Hello, world.");
        let world_units: Vec<_> = units
            .iter()
            .filter(|u| !u.is_pause() && u.boundary == Boundary::LowEnd)
            .collect();

        // All of "world"'s phonemes carry the falling boundary
        assert!(!world_units.is_empty());
        assert_eq!(world_units[0].symbol, "w");
    }

    #[test]
    fn question_final_word_gets_high_end() {
        let units = ProsodyPlanner::new().plan("what is the time?");
        assert!(units.iter().any(|u| u.boundary == Boundary::HighEnd));
        assert!(units.iter().all(|u| u.boundary != Boundary::LowEnd));
    }

    #[test]
    fn every_third_word_gets_intermediate_break() {
        let phrases = ProsodyPlanner::new().phrases("one two three four five six seven");
        assert_eq!(phrases[0].words.len(), 7);

        let units = ProsodyPlanner::new().plan("one two three four five six seven");
        let intermediate: Vec<_> = units
            .iter()
            .filter(|u| u.is_pause() && u.boundary == Boundary::IntermediatePhrase)
            .collect();

        // Words at index 2 and 5 ("three", "six")
        assert_eq!(intermediate.len(), 2);
    }

    #[test]
    fn stronger_boundaries_pause_longer() {
        assert!(Boundary::HighEnd.pause_secs() > Boundary::IntermediatePhrase.pause_secs());
        assert!(Boundary::IntermediatePhrase.pause_secs() > Boundary::None.pause_secs());
    }

    // -- grapheme to phoneme --------------------------------------------------

    #[test]
    fn dictionary_words_use_exact_pronunciation() {
        assert_eq!(word_to_phonemes("hello"), vec!["hh", "eh", "l", "ow"]);
        assert_eq!(word_to_phonemes("world"), vec!["w", "er", "l", "d"]);
    }

    #[test]
    fn digraphs_resolve_before_letters() {
        assert_eq!(word_to_phonemes("ship"), vec!["sh", "ih", "p"]);
        assert_eq!(word_to_phonemes("phone"), vec!["f", "aa", "n", "eh"]);
        assert_eq!(word_to_phonemes("ring"), vec!["r", "ih", "ng"]);
    }

    #[test]
    fn vowel_pairs_resolve_before_letters() {
        assert_eq!(word_to_phonemes("seen"), vec!["s", "iy", "n"]);
        assert_eq!(word_to_phonemes("boot"), vec!["b", "uw", "t"]);
        assert_eq!(word_to_phonemes("cart"), vec!["k", "aa", "r", "t"]);
    }

    #[test]
    fn unknown_spelling_falls_back_to_schwa() {
        assert_eq!(word_to_phonemes("42"), vec![SCHWA]);
        assert_eq!(word_to_phonemes("---"), vec![SCHWA]);
    }

    // -- unit timing ----------------------------------------------------------

    #[test]
    fn vowels_run_longer_than_plosives() {
        assert!(class_duration(PhonemeClass::Vowel) > class_duration(PhonemeClass::Plosive));
        assert!(class_duration(PhonemeClass::LiquidNasal) > class_duration(PhonemeClass::Fricative));
    }

    #[test]
    fn emphasized_word_scales_duration_and_gain() {
        let plain = ProsodyPlanner::new().plan("stop");
        let emphasized = ProsodyPlanner::new().plan("STOP");

        let plain_vowel = plain.iter().find(|u| u.class() == PhonemeClass::Vowel).unwrap();
        let emph_vowel = emphasized
            .iter()
            .find(|u| u.class() == PhonemeClass::Vowel)
            .unwrap();

        assert!((emph_vowel.duration - plain_vowel.duration * 1.3).abs() < 1e-6);
        assert!(emph_vowel.gain > plain_vowel.gain);
        assert!(emph_vowel.emphasis);
    }

    #[test]
    fn pauses_carry_no_gain() {
        let units = ProsodyPlanner::new().plan("hello there");
        assert!(units.iter().filter(|u| u.is_pause()).all(|u| u.gain == 0.0));
    }
}
