use crate::{hybridized_poisson, test_vector};
use hybridization::config::{FormCompilerParameters, InnerSolverOptions, KspType, PcType};
use hybridization::error::{HybridizationError, ReducedSolveError};
use hybridization::element::ElementFamily;
use hybridization::hybridization::reduced::ReducedSolver;
use hybridization::hybridization::schur::SchurComplement;
use hybridization::tensor::Interpreter;
use hybridization_sparse::cg::SolveErrorKind;
use hybridization_sparse::Nullspace;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

fn reduced_operator() -> CsrMatrix<f64> {
    let (operator, spaces) = hybridized_poisson(3, ElementFamily::RaviartThomas, 1);
    let schur = SchurComplement::new(&operator, &spaces, &Interpreter, &FormCompilerParameters::default()).unwrap();
    schur.matrix().clone()
}

fn options(ksp_type: KspType, pc_type: PcType) -> InnerSolverOptions {
    InnerSolverOptions {
        ksp_type,
        pc_type,
        rtol: 1e-12,
        max_it: 1000,
    }
}

#[test]
fn solver_combinations_agree_with_dense_solve() {
    let matrix = reduced_operator();
    let rhs = test_vector(matrix.nrows());
    let expected = DMatrix::from(&matrix).cholesky().unwrap().solve(&rhs);

    for (ksp_type, pc_type) in [
        (KspType::Cg, PcType::Jacobi),
        (KspType::Cg, PcType::None),
        (KspType::Cg, PcType::Cholesky),
        (KspType::PreOnly, PcType::Cholesky),
    ] {
        let mut solver = ReducedSolver::new(options(ksp_type, pc_type), None);
        let mut solution = DVector::zeros(matrix.nrows());
        let iterations = solver.solve(&matrix, &rhs, &mut solution).unwrap();
        assert!(iterations > 0);
        assert_eq!(solver.last_iterations(), Some(iterations));
        assert_matrix_eq!(solution, expected, comp = abs, tol = 1e-8);

        if pc_type == PcType::Cholesky {
            assert!(iterations <= 2);
        }
    }
}

#[test]
fn preconditioner_is_refreshed_lazily() {
    let matrix = reduced_operator();
    let rhs = test_vector(matrix.nrows());
    let mut solver = ReducedSolver::new(options(KspType::PreOnly, PcType::Cholesky), None);
    assert!(solver.is_stale());
    assert_eq!(solver.last_iterations(), None);

    let mut solution = DVector::zeros(matrix.nrows());
    solver.solve(&matrix, &rhs, &mut solution).unwrap();
    assert!(!solver.is_stale());

    // Scaling the operator without refreshing keeps the old factorization
    let mut scaled = matrix.clone();
    scaled.values_mut().iter_mut().for_each(|v| *v *= 2.0);
    let mut stale_solution = DVector::zeros(matrix.nrows());
    solver.solve(&scaled, &rhs, &mut stale_solution).unwrap();
    assert_matrix_eq!(stale_solution, solution, comp = abs, tol = 1e-12);

    solver.mark_stale();
    assert!(solver.is_stale());
    let mut fresh_solution = DVector::zeros(matrix.nrows());
    solver.solve(&scaled, &rhs, &mut fresh_solution).unwrap();
    assert_matrix_eq!(fresh_solution * 2.0, solution, comp = abs, tol = 1e-10);

    solver.refresh(&matrix).unwrap();
    assert!(!solver.is_stale());
}

#[test]
fn singular_systems_are_solved_in_the_nullspace_complement() {
    // Pure Neumann 1D Laplacian, whose kernel is the constant vector
    let n = 8;
    let mut coo = CooMatrix::new(n, n);
    for i in 0..n - 1 {
        coo.push(i, i, 1.0);
        coo.push(i + 1, i + 1, 1.0);
        coo.push(i, i + 1, -1.0);
        coo.push(i + 1, i, -1.0);
    }
    let matrix = CsrMatrix::<f64>::from(&coo);
    let nullspace = Nullspace::new(vec![DVector::from_element(n, 1.0)]).unwrap();

    let mut rhs = test_vector(n);
    let mean = rhs.mean();
    rhs.add_scalar_mut(-mean);

    let mut solver = ReducedSolver::new(options(KspType::Cg, PcType::Jacobi), Some(nullspace));
    assert_eq!(solver.nullspace().map(|nullspace| nullspace.len()), Some(1));
    let mut solution = DVector::<f64>::zeros(n);
    solver.solve(&matrix, &rhs, &mut solution).unwrap();

    assert_scalar_eq!(solution.sum(), 0.0, comp = abs, tol = 1e-10);
    let residual = &matrix * &solution - &rhs;
    assert!(residual.norm() <= 1e-9 * rhs.norm());
}

#[test]
fn krylov_failures_are_reported() {
    let matrix = reduced_operator();
    let rhs = test_vector(matrix.nrows());
    let mut solver = ReducedSolver::new(
        InnerSolverOptions {
            max_it: 1,
            ..options(KspType::Cg, PcType::None)
        },
        None,
    );
    let mut solution = DVector::zeros(matrix.nrows());
    match solver.solve(&matrix, &rhs, &mut solution) {
        Err(HybridizationError::Solver(ReducedSolveError::Krylov { num_iterations, kind })) => {
            assert_eq!(num_iterations, 1);
            assert!(matches!(kind, SolveErrorKind::MaxIterationsReached { max_iter: 1 }));
        }
        other => panic!("expected a Krylov failure, got {:?}", other),
    }
    assert_eq!(solver.last_iterations(), None);
}

#[test]
fn view_describes_the_solver() {
    let matrix = reduced_operator();
    let rhs = test_vector(matrix.nrows());
    let mut solver = ReducedSolver::new(InnerSolverOptions::default(), None);

    let mut text = String::new();
    solver.view(&mut text).unwrap();
    assert_eq!(
        text.lines().collect::<Vec<_>>(),
        vec![
            "  reduced solver: ksp_type = cg, pc_type = jacobi, rtol = 1e-10, max_it = 10000",
            "  reduced nullspace: none",
        ]
    );

    let mut solution = DVector::zeros(matrix.nrows());
    let iterations = solver.solve(&matrix, &rhs, &mut solution).unwrap();
    let mut text = String::new();
    solver.view(&mut text).unwrap();
    assert_eq!(
        text.lines().last(),
        Some(format!("  last solve: {} iterations", iterations).as_str())
    );
}
