//! Iterative solvers and nullspace handling for sparse systems.
//!
//! The crate works on `nalgebra` vectors and `nalgebra-sparse` matrices. Everything is expressed
//! through the [`LinearOperator`] trait, so matrices, diagonal preconditioners and matrix-free
//! operators are interchangeable.

pub mod cg;
pub mod nullspace;
pub mod operator;

pub use nalgebra_sparse;
pub use nullspace::{Nullspace, NullspaceError};
pub use operator::{IdentityOperator, JacobiPreconditioner, LinearOperator};
