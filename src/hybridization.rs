//! The hybridization preconditioner.
//!
//! For a mixed operator on `W = V x Q` (H(div) flux space `V`, L2 scalar space `Q`), the
//! preconditioner
//!
//! 1. breaks `V` into the discontinuous space `V_b` and builds the trace space `T` of Lagrange
//!    multipliers on the facets ([`transform`]),
//! 2. restates the operator on `W_b = V_b x Q` and eliminates `W_b` locally, which yields the
//!    reduced operator `S = K A^-1 K^T` on `T`, where `K` couples multipliers to the jumps of
//!    the normal flux ([`schur`]),
//! 3. solves `S lambda = K A^-1 f_b` with the configured solver ([`reduced`]),
//! 4. recovers the broken unknowns by local back-substitution ([`reconstruct`]),
//! 5. transfers data between the broken and conforming representations ([`projection`]).
//!
//! The lifecycle is driven by [`HybridizationPc`] through the [`Preconditioner`] trait.
pub mod nullspace;
pub mod pc;
pub mod projection;
pub mod reconstruct;
pub mod reduced;
pub mod schur;
pub mod transform;

pub use pc::{HybridizationPc, PcContext, Preconditioner};
pub use transform::{hybridize_spaces, trace_degree, HybridSpaces};
