use crate::{constant_scalar, dense_matrix, hybridized_poisson, hybridized_singular_poisson, test_vector};
use hybridization::config::FormCompilerParameters;
use hybridization::element::ElementFamily;
use hybridization::error::{HybridizationError, ReducedSolveError};
use hybridization::form::BilinearForm;
use hybridization::hybridization::nullspace::transfer_nullspace;
use hybridization::hybridization::projection::LocalProjector;
use hybridization::hybridization::schur::SchurComplement;
use hybridization::hybridization::HybridSpaces;
use hybridization::tensor::Interpreter;
use hybridization_sparse::{Nullspace, NullspaceError};
use matrixcompare::assert_scalar_eq;
use nalgebra::DVector;

fn transfer(
    operator: &BilinearForm<f64>,
    spaces: &HybridSpaces<f64>,
    vectors: &[DVector<f64>],
) -> Result<Option<Nullspace<f64>>, HybridizationError> {
    let parameters = FormCompilerParameters::default();
    let schur = SchurComplement::new(operator, spaces, &Interpreter, &parameters).unwrap();
    let projector = LocalProjector::new(spaces, &Interpreter, &parameters).unwrap();
    transfer_nullspace(vectors, spaces, &schur, &projector, &Interpreter, &parameters)
}

#[test]
fn transferred_nullspace_is_in_the_kernel_of_the_reduced_operator() {
    for (family, degree) in [(ElementFamily::RaviartThomas, 1), (ElementFamily::RaviartThomas, 2), (ElementFamily::BrezziDouglasMarini, 1)] {
        let (operator, spaces) = hybridized_singular_poisson(3, family, degree);
        let constant = constant_scalar(&spaces.original);
        let image = dense_matrix(&operator) * &constant;
        assert!(image.norm() <= 1e-12 * constant.norm());

        let parameters = FormCompilerParameters::default();
        let schur = SchurComplement::new(&operator, &spaces, &Interpreter, &parameters).unwrap();
        let projector = LocalProjector::new(&spaces, &Interpreter, &parameters).unwrap();
        let nullspace = transfer_nullspace(&[constant], &spaces, &schur, &projector, &Interpreter, &parameters)
            .unwrap()
            .unwrap();
        assert_eq!(nullspace.len(), 1);
        assert_eq!(nullspace.dim(), Some(spaces.trace.num_dofs()));

        let v = &nullspace.vectors()[0];
        assert_scalar_eq!(v.norm(), 1.0, comp = abs, tol = 1e-12);
        let reduced_image = schur.matrix() * v;
        assert!(reduced_image.norm() <= 1e-10, "|S v| = {}", reduced_image.norm());

        // Multipliers of boundary facets are constrained
        for &dof in spaces.trace_bc.dofs() {
            assert!(v[dof].abs() <= 1e-14);
        }
    }
}

#[test]
fn scaled_kernel_vectors_are_degenerate() {
    let (operator, spaces) = hybridized_singular_poisson(2, ElementFamily::RaviartThomas, 1);
    let constant = constant_scalar(&spaces.original);
    match transfer(&operator, &spaces, &[constant.clone(), 2.0 * constant]) {
        Err(HybridizationError::Solver(ReducedSolveError::Nullspace(err))) => {
            assert_eq!(err, NullspaceError::DegenerateVector { index: 1 })
        }
        other => panic!("expected a degenerate nullspace vector, got {:?}", other),
    }
}

#[test]
fn vectors_outside_the_kernel_are_rejected() {
    let (operator, spaces) = hybridized_singular_poisson(2, ElementFamily::RaviartThomas, 1);
    let constant = constant_scalar(&spaces.original);
    let vectors = [constant, test_vector(spaces.original.num_dofs())];
    assert!(matches!(
        transfer(&operator, &spaces, &vectors),
        Err(HybridizationError::Solver(ReducedSolveError::NotInKernel { index: 1 }))
    ));

    // Without the boundary terms, constant scalar fields are not in the kernel
    let (operator, spaces) = hybridized_poisson(2, ElementFamily::RaviartThomas, 1);
    let constant = constant_scalar(&spaces.original);
    assert!(matches!(
        transfer(&operator, &spaces, &[constant]),
        Err(HybridizationError::Solver(ReducedSolveError::NotInKernel { index: 0 }))
    ));
}

#[test]
fn empty_nullspace_is_ignored() {
    let (operator, spaces) = hybridized_singular_poisson(1, ElementFamily::RaviartThomas, 1);
    assert!(transfer(&operator, &spaces, &[]).unwrap().is_none());
}

#[test]
fn nullspace_vectors_of_wrong_length_are_rejected() {
    let (operator, spaces) = hybridized_singular_poisson(2, ElementFamily::RaviartThomas, 1);
    let n = spaces.original.num_dofs();
    assert!(matches!(
        transfer(&operator, &spaces, &[test_vector(n + 1)]),
        Err(HybridizationError::Discretization(_))
    ));
}
