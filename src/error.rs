//! Error types for the hybridization pipeline.
//!
//! Every stage reports failures through one of the enums in this module. They are all
//! collected in [`HybridizationError`], which is what the preconditioner lifecycle methods
//! return. Failures of the finite element layer (meshes, elements, spaces) are reported as
//! [`eyre::Report`]s and wrapped in [`HybridizationError::Discretization`].
use crate::element::ElementFamily;
use hybridization_sparse::cg::SolveErrorKind;
use hybridization_sparse::NullspaceError;
use std::error::Error;
use std::fmt;

/// The problem handed to the preconditioner cannot be hybridized, or the options are invalid.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigurationError {
    ExtrudedMesh,
    /// Hybridization needs exactly one vector and one scalar space.
    WrongNumberOfSpaces { found: usize },
    BothSpacesVectorValued,
    NoVectorValuedSpace,
    /// The scalar space is copied verbatim between broken and conforming representations,
    /// which requires it to be discontinuous.
    ScalarSpaceNotL2 { family: ElementFamily },
    /// The vector element has no associated trace space.
    UnsupportedTraceFamily { family: ElementFamily, degree: usize },
    /// The operator must be posed on identical test and trial spaces.
    MismatchedArguments,
    InvalidOption { key: String, value: String, reason: &'static str },
    UnsupportedSolver { ksp_type: String, pc_type: String },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExtrudedMesh => write!(f, "hybridization is not supported on extruded meshes"),
            Self::WrongNumberOfSpaces { found } => write!(
                f,
                "expected a mixed space of exactly two spaces, but found {} space(s)",
                found
            ),
            Self::BothSpacesVectorValued => write!(f, "cannot hybridize a mixed space with two vector-valued spaces"),
            Self::NoVectorValuedSpace => write!(f, "the mixed space has no vector-valued (H(div)) space"),
            Self::ScalarSpaceNotL2 { family } => {
                write!(f, "the scalar space must be discontinuous (L2), but has family {}", family)
            }
            Self::UnsupportedTraceFamily { family, degree } => write!(
                f,
                "no trace space is known for the {} element of degree {}",
                family, degree
            ),
            Self::MismatchedArguments => write!(f, "the operator's test and trial spaces differ"),
            Self::InvalidOption { key, value, reason } => {
                write!(f, "invalid value '{}' for option '{}': {}", value, key, reason)
            }
            Self::UnsupportedSolver { ksp_type, pc_type } => write!(
                f,
                "unsupported reduced solver configuration (ksp_type = {}, pc_type = {})",
                ksp_type, pc_type
            ),
        }
    }
}

impl Error for ConfigurationError {}

/// Errors raised while compiling or evaluating element-local tensor expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AlgebraicError {
    /// The operation requires a rank-2 operand.
    NotRank2 { operation: &'static str, rank: usize },
    /// The ranks of the operands are not valid for the operation.
    IncompatibleRanks {
        operation: &'static str,
        left: usize,
        right: usize,
    },
    /// The argument spaces of the operands do not match.
    IncompatibleSpaces { operation: &'static str },
    /// The row and column spaces of an inverted block differ.
    NonSquareInverse,
    UnboundCoefficient { name: String },
    /// The bound function does not live on the space the coefficient was declared with.
    IncompatibleBinding { name: String },
    /// Local factorization failed because the block is numerically singular.
    SingularLocalBlock { cell: usize },
    /// The expression has a different rank than the assembly target.
    UnexpectedRank { expected: usize, actual: usize },
}

impl fmt::Display for AlgebraicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRank2 { operation, rank } => {
                write!(f, "{} requires a rank-2 operand, but the operand has rank {}", operation, rank)
            }
            Self::IncompatibleRanks { operation, left, right } => write!(
                f,
                "{} is not defined for operands of rank {} and {}",
                operation, left, right
            ),
            Self::IncompatibleSpaces { operation } => {
                write!(f, "{} of tensors with incompatible argument spaces", operation)
            }
            Self::NonSquareInverse => write!(f, "cannot invert a tensor whose row and column spaces differ"),
            Self::UnboundCoefficient { name } => write!(f, "no function bound to coefficient '{}'", name),
            Self::IncompatibleBinding { name } => write!(
                f,
                "function bound to coefficient '{}' does not live on the declared space",
                name
            ),
            Self::SingularLocalBlock { cell } => write!(f, "local factorization failed: block is singular on cell {}", cell),
            Self::UnexpectedRank { expected, actual } => {
                write!(f, "expected an expression of rank {}, but found rank {}", expected, actual)
            }
        }
    }
}

impl Error for AlgebraicError {}

/// Failures of the reduced (trace) system solve or of the projections surrounding it.
#[derive(Debug)]
#[non_exhaustive]
pub enum ReducedSolveError {
    Krylov { num_iterations: usize, kind: SolveErrorKind },
    Projection { num_iterations: usize, kind: SolveErrorKind },
    CholeskyFailed,
    Nullspace(NullspaceError),
    /// The trace multiplier of the nullspace vector at the given index is not mapped to zero by
    /// the reduced operator, i.e. the vector is not in the kernel of the original operator.
    NotInKernel { index: usize },
}

impl fmt::Display for ReducedSolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Krylov { num_iterations, kind } => write!(
                f,
                "reduced system solve failed after {} iterations: {}",
                num_iterations, kind
            ),
            Self::Projection { num_iterations, kind } => write!(
                f,
                "projection into the conforming space failed after {} iterations: {}",
                num_iterations, kind
            ),
            Self::CholeskyFailed => write!(f, "Cholesky factorization of the reduced operator failed"),
            Self::Nullspace(err) => write!(f, "invalid nullspace for the reduced operator: {}", err),
            Self::NotInKernel { index } => write!(
                f,
                "nullspace vector {} is not in the kernel of the operator: its reduced image is not zero",
                index
            ),
        }
    }
}

impl Error for ReducedSolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Nullspace(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NullspaceError> for ReducedSolveError {
    fn from(err: NullspaceError) -> Self {
        Self::Nullspace(err)
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum HybridizationError {
    Configuration(ConfigurationError),
    Algebraic(AlgebraicError),
    Solver(ReducedSolveError),
    Discretization(eyre::Report),
    NotImplemented(&'static str),
    /// The preconditioner was used before it was set up.
    NotSetUp,
}

impl fmt::Display for HybridizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(err) => write!(f, "configuration error: {}", err),
            Self::Algebraic(err) => write!(f, "local tensor error: {}", err),
            Self::Solver(err) => write!(f, "solver error: {}", err),
            Self::Discretization(err) => write!(f, "discretization error: {}", err),
            Self::NotImplemented(what) => write!(f, "{} is not implemented", what),
            Self::NotSetUp => write!(f, "the preconditioner has not been set up"),
        }
    }
}

impl Error for HybridizationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Configuration(err) => Some(err),
            Self::Algebraic(err) => Some(err),
            Self::Solver(err) => Some(err),
            Self::Discretization(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<ConfigurationError> for HybridizationError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err)
    }
}

impl From<AlgebraicError> for HybridizationError {
    fn from(err: AlgebraicError) -> Self {
        Self::Algebraic(err)
    }
}

impl From<ReducedSolveError> for HybridizationError {
    fn from(err: ReducedSolveError) -> Self {
        Self::Solver(err)
    }
}

impl From<NullspaceError> for HybridizationError {
    fn from(err: NullspaceError) -> Self {
        Self::Solver(ReducedSolveError::Nullspace(err))
    }
}

impl From<eyre::Report> for HybridizationError {
    fn from(err: eyre::Report) -> Self {
        Self::Discretization(err)
    }
}
