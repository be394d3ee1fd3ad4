use crate::{apply, flux_scalar_space, mixed_poisson, options, space, test_vector, unit_square};
use hybridization::element::ElementFamily;
use hybridization::error::{ConfigurationError, HybridizationError};
use hybridization::form::{BilinearForm, Constant};
use hybridization::space::MixedSpace;
use hybridization::{HybridizationPc, PcContext, Preconditioner};
use nalgebra::{DVector, DVectorView};
use std::sync::Arc;

fn initialize_error(context: &PcContext<f64>) -> HybridizationError {
    let mut pc = HybridizationPc::new();
    let err = pc.initialize(context).unwrap_err();
    assert!(!pc.is_ready());
    err
}

fn configuration_error(context: &PcContext<f64>) -> ConfigurationError {
    match initialize_error(context) {
        HybridizationError::Configuration(err) => err,
        other => panic!("expected a configuration error, got {:?}", other),
    }
}

/// An operator without terms on the given test and trial spaces.
fn empty_operator(test: MixedSpace<f64>, trial: MixedSpace<f64>) -> PcContext<f64> {
    PcContext::new(BilinearForm::new(test, trial).unwrap())
}

#[test]
fn unsupported_mixed_spaces_are_rejected() {
    let mesh = unit_square(2);
    let rt1 = space(&mesh, ElementFamily::RaviartThomas, 1);
    let bdm1 = space(&mesh, ElementFamily::BrezziDouglasMarini, 1);
    let n1curl = space(&mesh, ElementFamily::Nedelec, 1);
    let dg0 = space(&mesh, ElementFamily::DiscontinuousLagrange, 0);

    let three = MixedSpace::new(vec![Arc::clone(&rt1), Arc::clone(&dg0), Arc::clone(&dg0)]).unwrap();
    assert_eq!(
        configuration_error(&empty_operator(three.clone(), three)),
        ConfigurationError::WrongNumberOfSpaces { found: 3 }
    );

    let two_vector = MixedSpace::new(vec![Arc::clone(&rt1), Arc::clone(&bdm1)]).unwrap();
    assert_eq!(
        configuration_error(&empty_operator(two_vector.clone(), two_vector)),
        ConfigurationError::BothSpacesVectorValued
    );

    let curl = MixedSpace::new(vec![n1curl, Arc::clone(&dg0)]).unwrap();
    assert_eq!(
        configuration_error(&empty_operator(curl.clone(), curl)),
        ConfigurationError::UnsupportedTraceFamily {
            family: ElementFamily::Nedelec,
            degree: 1
        }
    );

    let test = MixedSpace::new(vec![Arc::clone(&rt1), Arc::clone(&dg0)]).unwrap();
    let trial = MixedSpace::new(vec![bdm1, dg0]).unwrap();
    assert_eq!(
        configuration_error(&empty_operator(test, trial)),
        ConfigurationError::MismatchedArguments
    );
}

#[test]
fn invalid_options_are_rejected_at_setup() {
    let space = flux_scalar_space(1, ElementFamily::RaviartThomas, 1);
    let operator = mixed_poisson(&space, &Constant::new(1.0));

    let context = PcContext::new(Arc::clone(&operator)).with_options("", options(&[("hybridization_ksp_type", "bicg")]));
    assert!(matches!(
        configuration_error(&context),
        ConfigurationError::InvalidOption { .. }
    ));

    let context = PcContext::new(Arc::clone(&operator)).with_options(
        "",
        options(&[("hybridization_ksp_type", "preonly"), ("hybridization_pc_type", "none")]),
    );
    assert!(matches!(
        configuration_error(&context),
        ConfigurationError::UnsupportedSolver { .. }
    ));
}

#[test]
fn use_before_setup_is_an_error() {
    let space = flux_scalar_space(1, ElementFamily::RaviartThomas, 1);
    let context = PcContext::new(mixed_poisson(&space, &Constant::new(1.0)));
    let mut pc = HybridizationPc::<f64>::new();
    assert!(!pc.is_ready());
    assert!(pc.schur_complement().is_none());

    let x = DVector::<f64>::zeros(space.num_dofs());
    let mut y = DVector::zeros(space.num_dofs());
    assert!(matches!(
        pc.apply(DVectorView::from(&x), (&mut y).into()),
        Err(HybridizationError::NotSetUp)
    ));
    assert!(matches!(pc.update(&context), Err(HybridizationError::NotSetUp)));
}

#[test]
fn transpose_application_is_not_implemented() {
    let space = flux_scalar_space(1, ElementFamily::RaviartThomas, 1);
    let context = PcContext::new(mixed_poisson(&space, &Constant::new(1.0)));
    let mut pc = HybridizationPc::<f64>::new();
    let x = DVector::<f64>::zeros(space.num_dofs());
    let mut y = DVector::zeros(space.num_dofs());

    assert!(matches!(
        pc.apply_transpose(DVectorView::from(&x), (&mut y).into()),
        Err(HybridizationError::NotImplemented(_))
    ));
    pc.initialize(&context).unwrap();
    assert!(matches!(
        pc.apply_transpose(DVectorView::from(&x), (&mut y).into()),
        Err(HybridizationError::NotImplemented(_))
    ));
}

#[test]
fn vectors_of_wrong_length_are_rejected() {
    let space = flux_scalar_space(1, ElementFamily::RaviartThomas, 1);
    let mut pc = HybridizationPc::new();
    pc.initialize(&PcContext::new(mixed_poisson(&space, &Constant::new(1.0))))
        .unwrap();

    let x = DVector::<f64>::zeros(space.num_dofs() + 1);
    let mut y = DVector::zeros(space.num_dofs());
    assert!(matches!(
        pc.apply(DVectorView::from(&x), (&mut y).into()),
        Err(HybridizationError::Discretization(_))
    ));
}

#[test]
fn teardown_releases_state() {
    let space = flux_scalar_space(2, ElementFamily::RaviartThomas, 1);
    let context = PcContext::new(mixed_poisson(&space, &Constant::new(1.0)));
    let mut pc = HybridizationPc::new();
    pc.initialize(&context).unwrap();
    assert!(pc.is_ready());
    assert!(pc.config().is_some());
    let first = apply(&mut pc, &test_vector(space.num_dofs()));

    pc.teardown();
    assert!(!pc.is_ready());
    assert!(pc.spaces().is_none());
    assert!(pc.trace_solution().is_none());
    pc.teardown();

    // A torn down preconditioner can be set up again and behaves as before
    pc.initialize(&context).unwrap();
    let second = apply(&mut pc, &test_vector(space.num_dofs()));
    assert_eq!(first, second);
}

#[test]
fn failed_setup_leaves_preconditioner_unready() {
    let space = flux_scalar_space(1, ElementFamily::RaviartThomas, 1);
    let operator = mixed_poisson(&space, &Constant::new(1.0));
    let mut pc = HybridizationPc::new();
    pc.initialize(&PcContext::new(Arc::clone(&operator))).unwrap();

    let invalid = PcContext::new(operator).with_options("", options(&[("hybridization_ksp_rtol", "0")]));
    assert!(pc.initialize(&invalid).is_err());
    assert!(!pc.is_ready());
}

#[test]
fn view_describes_configuration() {
    let space = flux_scalar_space(2, ElementFamily::RaviartThomas, 1);
    let mut pc = HybridizationPc::<f64>::new();

    let mut text = String::new();
    pc.view(&mut text).unwrap();
    assert_eq!(text, "Hybridization preconditioner (not set up)\n");

    pc.initialize(&PcContext::new(mixed_poisson(&space, &Constant::new(1.0))))
        .unwrap();
    let mut text = String::new();
    pc.view(&mut text).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines[0], "Hybridization preconditioner");
    assert_eq!(lines[1], "  mixed space: RT1 x DG0 (24 dofs), broken: 32 dofs");
    assert_eq!(lines[2], "  trace space: HDiv Trace0 (16 dofs, 8 on the boundary)");
    assert!(lines[3].starts_with("  reduced operator: S = K A^-1 K^T, 16x16"));
    assert_eq!(lines[4], "  flux projection: rtol = 1e-8");
    assert!(lines.contains(&"  reduced solver: ksp_type = cg, pc_type = jacobi, rtol = 1e-10, max_it = 10000"));
    assert!(lines.contains(&"  reduced nullspace: none"));
}
