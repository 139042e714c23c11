//! Speech output: prosody planning, accent transformation, formant synthesis
//!
//! Reply text flows through three stages: [`prosody`] turns it into a timed
//! phoneme sequence, [`accent`] reshapes that sequence (and, upstream, the
//! text itself) toward an accent profile, and [`synth`] renders the result
//! to audio.

pub mod accent;
pub mod prosody;
pub mod synth;

pub use accent::{AccentProfile, RandomSource, ScriptedRandom, ThreadRandom};
pub use prosody::{Boundary, PhonemeClass, PhonemeUnit, ProsodyPlanner};
pub use synth::{FormantSynthesizer, SynthConfig, SynthOptions};
