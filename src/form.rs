//! A small language for bilinear forms over mixed spaces.
//!
//! A [`BilinearForm`] is a sum of [`FormTerm`]s. Each term couples one component of the test
//! space with one component of the trial space through an [`Integrand`] from a fixed
//! catalogue, integrated over a [`Measure`] and optionally scaled by a [`FormCoefficient`].
//!
//! Facet integrals are evaluated cell by cell: every cell adjacent to a facet contributes its own
//! side, with its own outward normal.
use crate::mesh::Mesh2d;
use crate::quadrature::{map_segment_rule, map_triangle_rule, segment_rule, triangle_rule, Quadrature};
use crate::space::MixedSpace;
use crate::Real;
use eyre::eyre;
use itertools::izip;
use nalgebra::{DMatrix, DMatrixViewMut, Point2, Scalar, Vector2};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Integration domain of a term.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measure {
    /// Cell interiors (`dx`).
    Cell,
    /// Facets shared by two cells (`dS`).
    InteriorFacet,
    /// Facets on the boundary of the mesh (`ds`).
    ExteriorFacet,
}

impl Measure {
    pub fn is_facet(&self) -> bool {
        !matches!(self, Self::Cell)
    }
}

/// The catalogue of integrands, in terms of a test function `v` and a trial function `u`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Integrand {
    /// `u . v` for vector arguments, `u v` for scalar arguments.
    Inner,
    /// `div(v) u` with vector test and scalar trial function.
    DivTest,
    /// `v div(u)` with scalar test and vector trial function.
    DivTrial,
    /// `v (u . n)` with scalar test and vector trial function, on facets only.
    NormalTrial,
    /// `(v . n) u` with vector test and scalar trial function, on facets only.
    NormalTest,
}

/// A real constant shared between forms and the code that owns it.
///
/// Assigning a new value affects every form referencing the constant, the next time the form
/// is assembled.
#[derive(Debug, Clone)]
pub struct Constant<T> {
    value: Arc<RwLock<T>>,
}

impl<T: Real> Constant<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(value)),
        }
    }

    pub fn assign(&self, value: T) {
        *self.value.write() = value;
    }

    pub fn value(&self) -> T {
        *self.value.read()
    }
}

/// A scalar factor of a term.
#[derive(Clone)]
pub enum FormCoefficient<T: Scalar> {
    Constant(Constant<T>),
    /// A field given as a function of the physical coordinates, with the polynomial degree
    /// assumed for quadrature.
    Field {
        function: Arc<dyn Fn(&Point2<T>) -> T + Send + Sync>,
        degree: usize,
    },
}

impl<T: Real> FormCoefficient<T> {
    pub fn field(degree: usize, function: impl Fn(&Point2<T>) -> T + Send + Sync + 'static) -> Self {
        Self::Field {
            function: Arc::new(function),
            degree,
        }
    }

    pub fn evaluate(&self, x: &Point2<T>) -> T {
        match self {
            Self::Constant(constant) => constant.value(),
            Self::Field { function, .. } => function(x),
        }
    }

    fn degree(&self) -> usize {
        match self {
            Self::Constant(_) => 0,
            Self::Field { degree, .. } => *degree,
        }
    }
}

impl<T: Real> From<Constant<T>> for FormCoefficient<T> {
    fn from(constant: Constant<T>) -> Self {
        Self::Constant(constant)
    }
}

impl<T: Scalar> fmt::Debug for FormCoefficient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(constant) => f.debug_tuple("Constant").field(constant).finish(),
            Self::Field { degree, .. } => f.debug_struct("Field").field("degree", degree).finish(),
        }
    }
}

/// One term of a bilinear form.
#[derive(Debug, Clone)]
pub struct FormTerm<T: Scalar> {
    pub integrand: Integrand,
    /// Component of the test space.
    pub test: usize,
    /// Component of the trial space.
    pub trial: usize,
    pub measure: Measure,
    pub coefficient: Option<FormCoefficient<T>>,
}

impl<T: Real> FormTerm<T> {
    pub fn new(integrand: Integrand, test: usize, trial: usize, measure: Measure) -> Self {
        Self {
            integrand,
            test,
            trial,
            measure,
            coefficient: None,
        }
    }

    pub fn scaled_by(self, coefficient: impl Into<FormCoefficient<T>>) -> Self {
        Self {
            coefficient: Some(coefficient.into()),
            ..self
        }
    }
}

/// A bilinear form `a(u, v)` with test space `V` and trial space `U`.
///
/// Assembled local matrices have one row per test basis function and one column per trial
/// basis function.
#[derive(Debug, Clone)]
pub struct BilinearForm<T: Scalar> {
    test_space: MixedSpace<T>,
    trial_space: MixedSpace<T>,
    terms: Vec<FormTerm<T>>,
}

impl<T: Real> BilinearForm<T> {
    /// The zero form on the given spaces.
    pub fn new(test_space: impl Into<MixedSpace<T>>, trial_space: impl Into<MixedSpace<T>>) -> eyre::Result<Self> {
        let test_space = test_space.into();
        let trial_space = trial_space.into();
        if !Arc::ptr_eq(test_space.mesh(), trial_space.mesh()) {
            return Err(eyre!("test and trial spaces must be defined on the same mesh"));
        }
        Ok(Self {
            test_space,
            trial_space,
            terms: Vec::new(),
        })
    }

    pub fn with_term(mut self, term: FormTerm<T>) -> eyre::Result<Self> {
        self.add_term(term)?;
        Ok(self)
    }

    pub fn add_term(&mut self, term: FormTerm<T>) -> eyre::Result<()> {
        validate_term(&term, &self.test_space, &self.trial_space)?;
        self.terms.push(term);
        Ok(())
    }

    pub fn test_space(&self) -> &MixedSpace<T> {
        &self.test_space
    }

    pub fn trial_space(&self) -> &MixedSpace<T> {
        &self.trial_space
    }

    pub fn terms(&self) -> &[FormTerm<T>] {
        &self.terms
    }

    pub fn mesh(&self) -> &Arc<Mesh2d<T>> {
        self.test_space.mesh()
    }

    /// The same form posed on different spaces.
    ///
    /// The replacement spaces must use the same elements component by component, but may differ
    /// in continuity, e.g. to restate a form on broken spaces.
    pub fn replace_arguments(
        &self,
        test_space: impl Into<MixedSpace<T>>,
        trial_space: impl Into<MixedSpace<T>>,
    ) -> eyre::Result<Self> {
        let test_space = test_space.into();
        let trial_space = trial_space.into();
        for (old, new, kind) in [(&self.test_space, &test_space, "test"), (&self.trial_space, &trial_space, "trial")] {
            let same_elements = old.num_subspaces() == new.num_subspaces()
                && old
                    .subspaces()
                    .iter()
                    .zip(new.subspaces())
                    .all(|(a, b)| a.element() == b.element() && Arc::ptr_eq(a.mesh(), b.mesh()));
            if !same_elements {
                return Err(eyre!("replacement {} space does not match the form's {} space", kind, kind));
            }
        }
        let mut form = Self::new(test_space, trial_space)?;
        for term in &self.terms {
            form.add_term(term.clone())?;
        }
        Ok(form)
    }

    /// The block of the form coupling test component `i` with trial component `j`, posed on
    /// the corresponding subspaces.
    pub fn block(&self, i: usize, j: usize) -> eyre::Result<Self> {
        let mut form = Self::new(self.test_space.component(i), self.trial_space.component(j))?;
        for term in self.terms.iter().filter(|term| term.test == i && term.trial == j) {
            form.add_term(FormTerm {
                test: 0,
                trial: 0,
                ..term.clone()
            })?;
        }
        Ok(form)
    }

    /// Splits the form into its nonzero blocks, keyed by `(test component, trial component)`.
    pub fn split(&self) -> eyre::Result<BTreeMap<(usize, usize), Self>> {
        let mut blocks = BTreeMap::new();
        for term in &self.terms {
            if !blocks.contains_key(&(term.test, term.trial)) {
                blocks.insert((term.test, term.trial), self.block(term.test, term.trial)?);
            }
        }
        Ok(blocks)
    }

    /// Quadrature strength sufficient to integrate every term exactly on affine cells with
    /// polynomial coefficients.
    pub fn estimated_quadrature_degree(&self) -> usize {
        self.terms
            .iter()
            .map(|term| {
                let test = self.test_space.sub(term.test).element().polynomial_degree();
                let trial = self.trial_space.sub(term.trial).element().polynomial_degree();
                let coefficient = term.coefficient.as_ref().map(|c| c.degree()).unwrap_or(0);
                let derivatives = match term.integrand {
                    Integrand::DivTest | Integrand::DivTrial => 1,
                    _ => 0,
                };
                (test + trial + coefficient).saturating_sub(derivatives)
            })
            .max()
            .unwrap_or(0)
    }

    /// Assembles the local matrix of the form on the given cell.
    ///
    /// The output must have the dimensions `test_space.num_cell_dofs() x
    /// trial_space.num_cell_dofs()` and is overwritten.
    pub fn assemble_cell_matrix_into(
        &self,
        mut output: DMatrixViewMut<T>,
        cell_index: usize,
        quadrature_degree: usize,
    ) -> eyre::Result<()> {
        assert_eq!(output.nrows(), self.test_space.num_cell_dofs());
        assert_eq!(output.ncols(), self.trial_space.num_cell_dofs());
        output.fill(T::zero());

        let mesh = self.mesh();
        let cell_rule = triangle_rule(quadrature_degree);
        let facet_rule = segment_rule(quadrature_degree);

        for term in &self.terms {
            let test_space = self.test_space.sub(term.test);
            let trial_space = self.trial_space.sub(term.trial);
            let test_basis = test_space.cell_basis(cell_index);
            let trial_basis = trial_space.cell_basis(cell_index);
            let mut block = output.view_mut(
                (self.test_space.cell_offset(term.test), self.trial_space.cell_offset(term.trial)),
                (test_space.num_cell_dofs(), trial_space.num_cell_dofs()),
            );
            let scale = |x: &Point2<T>| term.coefficient.as_ref().map(|c| c.evaluate(x)).unwrap_or_else(T::one);

            match term.measure {
                Measure::Cell => {
                    let rule = map_triangle_rule(&cell_rule, &mesh.cell_vertices(cell_index));
                    for (&w, x) in rule.weights().iter().zip(rule.points()) {
                        let weight = w * scale(x);
                        match term.integrand {
                            Integrand::Inner => {
                                let v = test_basis.values(x)?;
                                let u = trial_basis.values(x)?;
                                block.gemm(weight, &v, &u.transpose(), T::one());
                            }
                            Integrand::DivTest => {
                                let div_v = test_basis.divergences(x)?;
                                let u = trial_basis.values(x)?;
                                block.ger(weight, &div_v, &u.column(0), T::one());
                            }
                            Integrand::DivTrial => {
                                let v = test_basis.values(x)?;
                                let div_u = trial_basis.divergences(x)?;
                                block.ger(weight, &v.column(0), &div_u, T::one());
                            }
                            Integrand::NormalTrial | Integrand::NormalTest => {
                                return Err(eyre!("normal components are only defined on facets"));
                            }
                        }
                    }
                }
                Measure::InteriorFacet | Measure::ExteriorFacet => {
                    for (local_facet, &facet_index) in mesh.cell_facets(cell_index).iter().enumerate() {
                        let on_boundary = mesh.is_boundary_facet(facet_index);
                        if on_boundary != (term.measure == Measure::ExteriorFacet) {
                            continue;
                        }
                        let [a, b] = mesh.facet_endpoints(facet_index);
                        let n = mesh.outward_normal(cell_index, local_facet);
                        let (weights, points, params) = map_segment_rule(&facet_rule, &a, &b);
                        for (&w, x, &s) in izip!(&weights, &points, &params) {
                            let weight = w * scale(x);
                            let v = test_basis.facet_values(local_facet, s, x)?;
                            let u = trial_basis.facet_values(local_facet, s, x)?;
                            match term.integrand {
                                Integrand::Inner => block.gemm(weight, &v, &u.transpose(), T::one()),
                                Integrand::NormalTrial => {
                                    block.ger(weight, &v.column(0), &normal_component(&u, &n), T::one())
                                }
                                Integrand::NormalTest => {
                                    block.ger(weight, &normal_component(&v, &n), &u.column(0), T::one())
                                }
                                Integrand::DivTest => {
                                    let div_v = test_basis.divergences(x)?;
                                    block.ger(weight, &div_v, &u.column(0), T::one());
                                }
                                Integrand::DivTrial => {
                                    let div_u = trial_basis.divergences(x)?;
                                    block.ger(weight, &v.column(0), &div_u, T::one());
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn assemble_cell_matrix(&self, cell_index: usize, quadrature_degree: usize) -> eyre::Result<DMatrix<T>> {
        let mut output = DMatrix::zeros(self.test_space.num_cell_dofs(), self.trial_space.num_cell_dofs());
        self.assemble_cell_matrix_into(output.as_view_mut(), cell_index, quadrature_degree)?;
        Ok(output)
    }
}

fn normal_component<T: Real>(values: &DMatrix<T>, n: &Vector2<T>) -> nalgebra::DVector<T> {
    values.column(0) * n.x + values.column(1) * n.y
}

fn validate_term<T: Real>(term: &FormTerm<T>, test_space: &MixedSpace<T>, trial_space: &MixedSpace<T>) -> eyre::Result<()> {
    if term.test >= test_space.num_subspaces() || term.trial >= trial_space.num_subspaces() {
        return Err(eyre!(
            "term refers to components ({}, {}) of spaces with {} and {} components",
            term.test,
            term.trial,
            test_space.num_subspaces(),
            trial_space.num_subspaces()
        ));
    }
    let test = test_space.sub(term.test).element();
    let trial = trial_space.sub(term.trial).element();
    let is_trace = |e: &crate::element::FiniteElement| e.family() == crate::element::ElementFamily::HDivTrace;

    if term.measure == Measure::Cell && (is_trace(test) || is_trace(trial)) {
        return Err(eyre!("trace functions can only be integrated over facets"));
    }

    let valid = match term.integrand {
        Integrand::Inner => test.value_dim() == trial.value_dim(),
        Integrand::DivTest => test.is_vector_valued() && !trial.is_vector_valued(),
        Integrand::DivTrial => !test.is_vector_valued() && trial.is_vector_valued(),
        Integrand::NormalTrial => term.measure.is_facet() && !test.is_vector_valued() && trial.is_vector_valued(),
        Integrand::NormalTest => term.measure.is_facet() && test.is_vector_valued() && !trial.is_vector_valued(),
    };
    if valid {
        Ok(())
    } else {
        Err(eyre!(
            "integrand {:?} over {:?} is not defined for test element {} and trial element {}",
            term.integrand,
            term.measure,
            test.family(),
            trial.family()
        ))
    }
}
