//! Streaming forced alignment
//!
//! CTC-style trellis matching of acoustic emissions against expected script
//! tokens, with a bounded online context for unbounded streams.

pub mod emission;
pub mod online;
pub mod viterbi;

// Re-export commonly used types
pub use emission::{EmissionBuffer, Emissions};
pub use online::OnlineMatcher;
pub use viterbi::{TokenMatch, ViterbiMatcher};

/// Acoustic token identifier; indexes a row of the emission matrix.
pub type TokenId = i64;

/// Capability of aligning an emission batch against a token sub-sequence.
///
/// Implementations are stateless per call; the emission view is borrowed only
/// for the duration of the call and never retained.
pub trait Matcher: Send + Sync {
    /// Return the best acceptable alignment of `tokens` inside `emissions`,
    /// or `None` when nothing passes the acceptance threshold.
    fn find_match(
        &self,
        emissions: Emissions<'_>,
        tokens: &[TokenId],
    ) -> crate::Result<Option<TokenMatch>>;
}
