//! Finite elements on triangles.
//!
//! Element bases are constructed per cell in physical coordinates: each element defines a
//! polynomial prime basis together with its degree-of-freedom functionals (moments against
//! facet and interior test functions), and the nodal basis is obtained by inverting the
//! generalized Vandermonde matrix `V_ij = l_i(p_j)`.
//!
//! Facet functionals are defined with respect to the global orientation of each facet (see
//! [`Mesh2d`]), so the cells sharing a facet agree on the associated degrees of freedom and no
//! sign corrections are needed when gluing cells together.
use crate::mesh::Mesh2d;
use crate::quadrature::{map_segment_rule, map_triangle_rule, segment_rule, triangle_rule, Quadrature};
use crate::Real;
use eyre::eyre;
use itertools::izip;
use nalgebra::{convert, DMatrix, DVector, Point2, Scalar, Vector2};
use prime::PrimeFunction;
use serde::{Deserialize, Serialize};
use std::fmt;

mod prime;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementFamily {
    RaviartThomas,
    BrezziDouglasMarini,
    /// Nedelec elements of the first kind.
    Nedelec,
    DiscontinuousLagrange,
    /// Scalar functions living on the mesh facets only.
    HDivTrace,
}

impl fmt::Display for ElementFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RaviartThomas => "RT",
            Self::BrezziDouglasMarini => "BDM",
            Self::Nedelec => "N1curl",
            Self::DiscontinuousLagrange => "DG",
            Self::HDivTrace => "HDiv Trace",
        };
        write!(f, "{}", name)
    }
}

/// The Sobolev space an element is conforming in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SobolevSpace {
    HDiv,
    HCurl,
    L2,
    /// Single-valued on facets, undefined in cell interiors.
    Trace,
}

/// A finite element family with a degree.
///
/// Degrees follow the convention that the lowest order vector elements have degree 1, and
/// the lowest order scalar elements have degree 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiniteElement {
    family: ElementFamily,
    degree: usize,
}

impl FiniteElement {
    pub fn new(family: ElementFamily, degree: usize) -> eyre::Result<Self> {
        use ElementFamily::*;
        match family {
            RaviartThomas | BrezziDouglasMarini | Nedelec if degree == 0 => {
                Err(eyre!("the {} element requires degree at least 1", family))
            }
            _ => Ok(Self { family, degree }),
        }
    }

    pub fn family(&self) -> ElementFamily {
        self.family
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn sobolev_space(&self) -> SobolevSpace {
        use ElementFamily::*;
        match self.family {
            RaviartThomas | BrezziDouglasMarini => SobolevSpace::HDiv,
            Nedelec => SobolevSpace::HCurl,
            DiscontinuousLagrange => SobolevSpace::L2,
            HDivTrace => SobolevSpace::Trace,
        }
    }

    pub fn value_dim(&self) -> usize {
        if self.is_vector_valued() {
            2
        } else {
            1
        }
    }

    pub fn is_vector_valued(&self) -> bool {
        use ElementFamily::*;
        matches!(self.family, RaviartThomas | BrezziDouglasMarini | Nedelec)
    }

    /// Number of degrees of freedom attached to each facet.
    pub fn num_facet_dofs(&self) -> usize {
        use ElementFamily::*;
        let k = self.degree;
        match self.family {
            RaviartThomas | Nedelec => k,
            BrezziDouglasMarini | HDivTrace => k + 1,
            DiscontinuousLagrange => 0,
        }
    }

    /// Number of degrees of freedom attached to the interior of each cell.
    pub fn num_interior_dofs(&self) -> usize {
        use ElementFamily::*;
        let k = self.degree;
        match self.family {
            RaviartThomas | Nedelec => k * (k - 1),
            BrezziDouglasMarini => (k - 1) * (k + 1),
            DiscontinuousLagrange => (k + 1) * (k + 2) / 2,
            HDivTrace => 0,
        }
    }

    pub fn num_cell_dofs(&self) -> usize {
        3 * self.num_facet_dofs() + self.num_interior_dofs()
    }

    /// The largest total degree of the polynomials in the element.
    pub fn polynomial_degree(&self) -> usize {
        self.degree
    }

    /// Builds the basis of the element on the given cell.
    pub fn cell_basis<T: Real>(&self, mesh: &Mesh2d<T>, cell_index: usize) -> eyre::Result<CellBasis<T>> {
        use ElementFamily::*;
        let k = self.degree;
        let (prime, facet_component, interior): (_, _, Vec<PrimeFunction<T>>) = match self.family {
            RaviartThomas => (
                prime::raviart_thomas(k),
                Some(FacetComponent::Normal),
                prime::vector_polynomials(k.checked_sub(2)),
            ),
            BrezziDouglasMarini => (
                prime::vector_polynomials(Some(k)),
                Some(FacetComponent::Normal),
                if k >= 2 { prime::nedelec(k - 1) } else { Vec::new() },
            ),
            Nedelec => (
                prime::nedelec(k),
                Some(FacetComponent::Tangential),
                prime::vector_polynomials(k.checked_sub(2)),
            ),
            DiscontinuousLagrange => (prime::scalar_polynomials(k), None, prime::scalar_polynomials(k)),
            HDivTrace => {
                return Ok(CellBasis {
                    element: *self,
                    kind: BasisKind::Trace,
                })
            }
        };

        let geometry = CellGeometry::new(mesh, cell_index);
        let vandermonde = self.vandermonde(mesh, cell_index, &geometry, &prime, facet_component, &interior);
        let coefficients = vandermonde.transpose().try_inverse().ok_or_else(|| {
            eyre!(
                "failed to construct {} basis of degree {} on cell {}: singular Vandermonde matrix",
                self.family,
                k,
                cell_index
            )
        })?;

        Ok(CellBasis {
            element: *self,
            kind: BasisKind::Polynomial {
                geometry,
                prime,
                coefficients,
            },
        })
    }

    /// Applies the degree-of-freedom functionals of the element to each prime function.
    ///
    /// Facet moments are taken against `s^m` along the facet parametrized by `s` in `[0, 1]`
    /// in its global orientation, and normalized by the facet length. Interior moments are
    /// normalized by the cell area.
    fn vandermonde<T: Real>(
        &self,
        mesh: &Mesh2d<T>,
        cell_index: usize,
        geometry: &CellGeometry<T>,
        prime: &[PrimeFunction<T>],
        facet_component: Option<FacetComponent>,
        interior: &[PrimeFunction<T>],
    ) -> DMatrix<T> {
        let n = prime.len();
        let value_dim = self.value_dim();
        let strength = 2 * self.degree + 1;
        let mut vandermonde = DMatrix::zeros(n, n);
        let mut row = 0;

        if let Some(component) = facet_component {
            let rule = segment_rule(strength);
            for &facet_index in mesh.cell_facets(cell_index) {
                let [a, b] = mesh.facet_endpoints(facet_index);
                let direction = match component {
                    FacetComponent::Normal => mesh.facet_normal(facet_index),
                    FacetComponent::Tangential => mesh.facet_tangent(facet_index),
                };
                let length = mesh.facet_length(facet_index);
                let (weights, points, params) = map_segment_rule(&rule, &a, &b);
                for m in 0..self.num_facet_dofs() {
                    for (w, x, s) in izip!(&weights, &points, &params) {
                        let values = prime::tabulate(prime, value_dim, &geometry.local_coordinates(x));
                        let test = s.powi(m as i32) * *w / length;
                        for j in 0..n {
                            let projected = values[(j, 0)] * direction.x + values[(j, 1)] * direction.y;
                            vandermonde[(row, j)] += projected * test;
                        }
                    }
                    row += 1;
                }
            }
        }

        let rule = map_triangle_rule(&triangle_rule(strength), &mesh.cell_vertices(cell_index));
        let area = mesh.cell_area(cell_index);
        for q in interior {
            for (w, x) in rule.weights().iter().zip(rule.points()) {
                let xi = geometry.local_coordinates(x);
                let values = prime::tabulate(prime, value_dim, &xi);
                for j in 0..n {
                    let mut product = T::zero();
                    for c in 0..value_dim {
                        product += values[(j, c)] * q.evaluate_component(c, &xi);
                    }
                    vandermonde[(row, j)] += product * *w / area;
                }
            }
            row += 1;
        }

        debug_assert_eq!(row, n);
        vandermonde
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FacetComponent {
    Normal,
    Tangential,
}

/// Affine map to the scaled local coordinates of a cell.
#[derive(Debug, Clone, PartialEq)]
struct CellGeometry<T: Scalar> {
    centroid: Point2<T>,
    scale: T,
}

impl<T: Real> CellGeometry<T> {
    fn new(mesh: &Mesh2d<T>, cell_index: usize) -> Self {
        Self {
            centroid: mesh.cell_centroid(cell_index),
            scale: mesh.cell_diameter(cell_index),
        }
    }

    fn local_coordinates(&self, x: &Point2<T>) -> Vector2<T> {
        (x - self.centroid) / self.scale
    }
}

#[derive(Debug, Clone, PartialEq)]
enum BasisKind<T: Scalar> {
    Polynomial {
        geometry: CellGeometry<T>,
        prime: Vec<PrimeFunction<T>>,
        /// Row `i` holds the prime coefficients of basis function `i`.
        coefficients: DMatrix<T>,
    },
    Trace,
}

/// The basis of an element on one cell.
///
/// Local degrees of freedom are ordered facet by facet (in local facet order), followed by
/// the interior degrees of freedom.
#[derive(Debug, Clone, PartialEq)]
pub struct CellBasis<T: Scalar> {
    element: FiniteElement,
    kind: BasisKind<T>,
}

impl<T: Real> CellBasis<T> {
    pub fn element(&self) -> &FiniteElement {
        &self.element
    }

    pub fn num_dofs(&self) -> usize {
        self.element.num_cell_dofs()
    }

    /// Basis function values at a point of the cell, one row per basis function.
    ///
    /// Trace bases have no values in the cell interior; use [`Self::facet_values`].
    pub fn values(&self, x: &Point2<T>) -> eyre::Result<DMatrix<T>> {
        match &self.kind {
            BasisKind::Polynomial {
                geometry,
                prime,
                coefficients,
            } => {
                let tabulated = prime::tabulate(prime, self.element.value_dim(), &geometry.local_coordinates(x));
                Ok(coefficients * tabulated)
            }
            BasisKind::Trace => Err(eyre!("trace basis functions cannot be evaluated in cell interiors")),
        }
    }

    /// Basis function values at a point on the given local facet.
    ///
    /// `s` is the parameter of the point along the facet in its global orientation.
    pub fn facet_values(&self, local_facet: usize, s: T, x: &Point2<T>) -> eyre::Result<DMatrix<T>> {
        match &self.kind {
            BasisKind::Polynomial { .. } => self.values(x),
            BasisKind::Trace => {
                let per_facet = self.element.num_facet_dofs();
                let mut values = DMatrix::zeros(self.num_dofs(), 1);
                let lagrange = lagrange_values(self.element.degree, s);
                values
                    .rows_mut(local_facet * per_facet, per_facet)
                    .copy_from(&lagrange);
                Ok(values)
            }
        }
    }

    /// Divergences of the basis functions at a point of the cell.
    pub fn divergences(&self, x: &Point2<T>) -> eyre::Result<DVector<T>> {
        match &self.kind {
            BasisKind::Polynomial {
                geometry,
                prime,
                coefficients,
            } if self.element.is_vector_valued() => {
                let local = prime::tabulate_divergence(prime, &geometry.local_coordinates(x));
                Ok(coefficients * local / geometry.scale)
            }
            _ => Err(eyre!("the divergence of {} functions is not defined", self.element.family)),
        }
    }
}

/// Lagrange polynomials of the given degree with equispaced nodes on `[0, 1]`.
fn lagrange_values<T: Real>(degree: usize, s: T) -> DVector<T> {
    if degree == 0 {
        return DVector::from_element(1, T::one());
    }
    let node = |j: usize| -> T { convert(j as f64 / degree as f64) };
    DVector::from_fn(degree + 1, |j, _| {
        (0..=degree)
            .filter(|&i| i != j)
            .fold(T::one(), |acc, i| acc * (s - node(i)) / (node(j) - node(i)))
    })
}
