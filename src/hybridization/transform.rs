//! Construction of the broken and trace spaces of a mixed problem.
use crate::bc::DirichletBc;
use crate::element::{ElementFamily, FiniteElement, SobolevSpace};
use crate::error::{ConfigurationError, HybridizationError};
use crate::space::{FunctionSpace, MixedSpace};
use crate::Real;
use log::debug;
use std::sync::Arc;

/// The spaces of a hybridized mixed problem.
#[derive(Debug, Clone)]
pub struct HybridSpaces<T: Real> {
    /// The conforming mixed space of the original problem.
    pub original: MixedSpace<T>,
    /// The mixed space with every component broken.
    pub broken: MixedSpace<T>,
    /// Scalar space of Lagrange multipliers on the facets.
    pub trace: Arc<FunctionSpace<T>>,
    /// Homogeneous conditions on the multipliers of all boundary facets.
    pub trace_bc: DirichletBc<T>,
    /// Index of the H(div) component.
    pub vector_index: usize,
    /// Index of the L2 component.
    pub scalar_index: usize,
}

/// Degree of the trace space associated with an H(div) element.
///
/// The trace of the normal component of RT of degree `k` has degree `k - 1`, that of BDM of
/// degree `k` has degree `k`.
pub fn trace_degree(element: &FiniteElement) -> Result<usize, ConfigurationError> {
    match element.family() {
        ElementFamily::RaviartThomas => Ok(element.degree() - 1),
        ElementFamily::BrezziDouglasMarini => Ok(element.degree()),
        family => Err(ConfigurationError::UnsupportedTraceFamily {
            family,
            degree: element.degree(),
        }),
    }
}

/// Validates the mixed space and builds its broken and trace spaces.
pub fn hybridize_spaces<T: Real>(space: &MixedSpace<T>) -> Result<HybridSpaces<T>, HybridizationError> {
    if space.mesh().is_extruded() {
        return Err(ConfigurationError::ExtrudedMesh.into());
    }
    if space.num_subspaces() != 2 {
        return Err(ConfigurationError::WrongNumberOfSpaces {
            found: space.num_subspaces(),
        }
        .into());
    }

    let vector_valued: Vec<bool> = space
        .subspaces()
        .iter()
        .map(|subspace| subspace.is_vector_valued())
        .collect();
    let (vector_index, scalar_index) = match vector_valued.as_slice() {
        [true, true] => return Err(ConfigurationError::BothSpacesVectorValued.into()),
        [false, false] => return Err(ConfigurationError::NoVectorValuedSpace.into()),
        [true, false] => (0, 1),
        _ => (1, 0),
    };

    let scalar_space = space.sub(scalar_index);
    if scalar_space.sobolev_space() != SobolevSpace::L2 {
        return Err(ConfigurationError::ScalarSpaceNotL2 {
            family: scalar_space.element().family(),
        }
        .into());
    }

    let vector_element = space.sub(vector_index).element();
    let degree = trace_degree(vector_element)?;
    let trace_element = FiniteElement::new(ElementFamily::HDivTrace, degree)?;
    let trace = Arc::new(FunctionSpace::new(Arc::clone(space.mesh()), trace_element)?);
    let trace_bc = DirichletBc::on_boundary(Arc::clone(&trace));
    let broken = space.broken();

    debug!(
        "Hybridizing {}{} x {}{}: {} broken dofs, {} trace dofs ({} constrained)",
        vector_element.family(),
        vector_element.degree(),
        scalar_space.element().family(),
        scalar_space.element().degree(),
        broken.num_dofs(),
        trace.num_dofs(),
        trace_bc.dofs().len()
    );

    Ok(HybridSpaces {
        original: space.clone(),
        broken,
        trace,
        trace_bc,
        vector_index,
        scalar_index,
    })
}
