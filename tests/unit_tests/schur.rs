use crate::{dense_matrix, mixed_space, space, test_vector, unit_square};
use hybridization::config::FormCompilerParameters;
use hybridization::element::ElementFamily;
use hybridization::form::{BilinearForm, Constant, FormTerm, Integrand, Measure};
use hybridization::function::Function;
use hybridization::hybridization::schur::SchurComplement;
use hybridization::hybridization::{hybridize_spaces, HybridSpaces};
use hybridization::tensor::Interpreter;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::DMatrix;

fn poisson_operator(family: ElementFamily, degree: usize, kappa: &Constant<f64>) -> (BilinearForm<f64>, HybridSpaces<f64>) {
    let mesh = unit_square(3);
    let flux = space(&mesh, family, degree);
    let scalar = space(&mesh, ElementFamily::DiscontinuousLagrange, degree - 1);
    let mixed = mixed_space(&flux, &scalar);
    let operator = BilinearForm::new(mixed.clone(), mixed.clone())
        .unwrap()
        .with_term(FormTerm::new(Integrand::Inner, 0, 0, Measure::Cell).scaled_by(kappa.clone()))
        .unwrap()
        .with_term(FormTerm::new(Integrand::DivTest, 0, 1, Measure::Cell))
        .unwrap()
        .with_term(FormTerm::new(Integrand::DivTrial, 1, 0, Measure::Cell))
        .unwrap();
    let spaces = hybridize_spaces(&mixed).unwrap();
    (operator, spaces)
}

fn build(operator: &BilinearForm<f64>, spaces: &HybridSpaces<f64>) -> SchurComplement<f64> {
    SchurComplement::new(operator, spaces, &Interpreter, &FormCompilerParameters::default()).unwrap()
}

#[test]
fn reduced_operator_matches_dense_elimination() {
    for (family, degree) in [(ElementFamily::RaviartThomas, 1), (ElementFamily::RaviartThomas, 2), (ElementFamily::BrezziDouglasMarini, 1)] {
        let (operator, spaces) = poisson_operator(family, degree, &Constant::new(1.0));
        let schur = build(&operator, &spaces);

        let a = dense_matrix(schur.broken_operator());
        let k = dense_matrix(schur.coupling());
        assert_eq!(a.nrows(), spaces.broken.num_dofs());
        assert_eq!((k.nrows(), k.ncols()), (spaces.trace.num_dofs(), spaces.broken.num_dofs()));
        let a_inv = a.try_inverse().unwrap();
        let expected = &k * &a_inv * k.transpose();

        let s = DMatrix::from(schur.matrix());
        assert_matrix_eq!(s, s.transpose(), comp = abs, tol = 1e-10);

        let constrained = spaces.trace_bc.dofs();
        let n = spaces.trace.num_dofs();
        for i in 0..n {
            for j in 0..n {
                let i_constrained = constrained.binary_search(&i).is_ok();
                let j_constrained = constrained.binary_search(&j).is_ok();
                if !i_constrained && !j_constrained {
                    assert_scalar_eq!(s[(i, j)], expected[(i, j)], comp = abs, tol = 1e-10);
                } else if i != j {
                    assert_eq!(s[(i, j)], 0.0);
                } else {
                    assert!(s[(i, i)] > 0.0);
                }
            }
        }

        // The reduced right-hand side is the elimination of the broken one, zero on the boundary
        let broken_rhs = Function::from_coefficients("f", spaces.broken.clone(), test_vector(spaces.broken.num_dofs())).unwrap();
        let expected_rhs = &k * &a_inv * broken_rhs.coefficients();
        let mut schur = schur;
        schur.assemble_rhs(&broken_rhs).unwrap();
        for i in 0..n {
            let value = schur.rhs().coefficients()[i];
            if constrained.binary_search(&i).is_ok() {
                assert_eq!(value, 0.0);
            } else {
                assert_scalar_eq!(value, expected_rhs[i], comp = abs, tol = 1e-10);
            }
        }
    }
}

#[test]
fn reduced_operator_is_positive_definite() {
    let (operator, spaces) = poisson_operator(ElementFamily::RaviartThomas, 1, &Constant::new(1.0));
    let schur = build(&operator, &spaces);
    let s = DMatrix::from(schur.matrix());
    assert!(s.cholesky().is_some());
}

#[test]
fn update_reassembles_in_place() {
    let kappa = Constant::new(1.0);
    let (operator, spaces) = poisson_operator(ElementFamily::RaviartThomas, 1, &kappa);
    let mut schur = build(&operator, &spaces);
    let initial = schur.matrix().clone();

    // Unchanged operator gives bit-identical values
    schur.update().unwrap();
    assert_eq!(schur.matrix().values(), initial.values());
    assert_eq!(schur.matrix().col_indices(), initial.col_indices());

    // Changed constants are picked up, and agree with a fresh build
    kappa.assign(4.0);
    schur.update().unwrap();
    assert_ne!(schur.matrix().values(), initial.values());
    let fresh = build(&operator, &spaces);
    assert_eq!(schur.matrix().values(), fresh.matrix().values());
    assert_eq!(schur.matrix().row_offsets(), fresh.matrix().row_offsets());
}
