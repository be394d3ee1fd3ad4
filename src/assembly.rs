//! Assembly of global sparse matrices and vectors from element-local contributions.
pub mod global;
