//! Hybridization preconditioning for mixed finite element saddle-point problems.
//!
//! Given a mixed problem posed on an H(div) vector space and an L2 scalar space, the
//! preconditioner breaks the vector space into element-local pieces, introduces Lagrange
//! multipliers on the mesh facets (the trace space), eliminates the broken unknowns cell by cell
//! and solves the much smaller, symmetric positive definite system for the multipliers. The
//! original unknowns are recovered by element-local back-substitution and projected back into
//! the conforming spaces.
//!
//! The [`hybridization`] module contains the preconditioner itself. The remaining modules form a
//! small, self-contained finite element layer for triangle meshes that the preconditioner is
//! built on: meshes, quadrature, elements, spaces, fields, bilinear forms and an element-local
//! tensor algebra.

use nalgebra::RealField;

pub mod assembly;
pub mod bc;
pub mod config;
pub mod connectivity;
pub mod element;
pub mod error;
pub mod form;
pub mod function;
pub mod hybridization;
pub mod mesh;
pub mod quadrature;
pub mod space;
pub mod tensor;

pub extern crate hybridization_sparse as sparse;
pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// Real scalar type used throughout the crate.
///
/// Serves as a trait alias for the traits frequently needed by generic routines.
pub trait Real: RealField + Copy {}

impl<T> Real for T where T: RealField + Copy {}

pub use error::HybridizationError;
pub use hybridization::{HybridizationPc, PcContext, Preconditioner};
