//! Errors surfaced to callers of this crate.
//!
//! Only conditions the embedding toolchain can meaningfully react to are
//! represented here. Internal invariant violations (malformed immediates,
//! unsupported operand combinations, resolver cycles with no scratch) are
//! compiler bugs and are asserted, not returned.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodegenError {
    /// The graph handed to us references a feature the configured target was
    /// built without (e.g. a vector operation with `has_msa` unset).
    #[error("target feature unavailable: {0}")]
    FeatureUnavailable(&'static str),
    /// The method's frame would exceed the addressable frame size.
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
}
