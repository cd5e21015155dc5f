//! The read-to-isoform classification engine: per-read classification,
//! metagene disambiguation, novel-isoform polishing, and compatibility
//! matrix assembly.

pub mod classify;
pub mod matrix;
pub mod metagene;
pub mod polish;

pub use classify::{Classification, KnownMatch, NovelCandidate, ReadSignature, classify};
pub use matrix::compile;
pub use metagene::assign;
pub use polish::{Polished, polish};
