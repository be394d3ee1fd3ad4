use crate::{space, unit_square};
use hybridization::assembly::global::{
    add_local_matrix_to_csr, add_local_vector, apply_homogeneous_dirichlet_bc_csr, apply_homogeneous_dirichlet_bc_rhs,
    assemble_pattern, zero_csr_from_pattern,
};
use hybridization::bc::DirichletBc;
use hybridization::element::ElementFamily;
use hybridization::space::MixedSpace;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::sync::Arc;

#[test]
fn pattern_couples_dofs_sharing_a_cell() {
    let mesh = unit_square(1);
    let rt1 = MixedSpace::from(space(&mesh, ElementFamily::RaviartThomas, 1));
    let dg0 = MixedSpace::from(space(&mesh, ElementFamily::DiscontinuousLagrange, 0));

    let pattern = assemble_pattern(&rt1, &rt1).unwrap();
    assert_eq!((pattern.major_dim(), pattern.minor_dim()), (5, 5));
    // The diagonal facet is shared by both cells and couples to every facet
    let diagonal_facet = mesh.cell_facets(0).iter().copied().find(|&f| !mesh.is_boundary_facet(f)).unwrap();
    assert_eq!(pattern.lane(diagonal_facet).len(), 5);
    for facet_index in mesh.boundary_facets() {
        assert_eq!(pattern.lane(*facet_index).len(), 3);
    }

    let rectangular = assemble_pattern(&dg0, &rt1).unwrap();
    assert_eq!((rectangular.major_dim(), rectangular.minor_dim()), (2, 5));
    assert_eq!(rectangular.nnz(), 6);
}

#[test]
fn local_contributions_are_summed() {
    let mesh = unit_square(1);
    let dg0 = MixedSpace::from(space(&mesh, ElementFamily::DiscontinuousLagrange, 0));
    let rt1 = MixedSpace::from(space(&mesh, ElementFamily::RaviartThomas, 1));
    let mut matrix: CsrMatrix<f64> = zero_csr_from_pattern(assemble_pattern(&rt1, &rt1).unwrap()).unwrap();

    let local = DMatrix::from_fn(3, 3, |i, j| (i * 3 + j) as f64);
    for cell_index in 0..2 {
        add_local_matrix_to_csr(&mut matrix, rt1.sub(0).cell_dofs(cell_index), rt1.sub(0).cell_dofs(cell_index), &local)
            .unwrap();
    }
    let dense = DMatrix::from(&matrix);
    let shared = mesh.cell_facets(0).iter().copied().find(|&f| !mesh.is_boundary_facet(f)).unwrap();
    let local_index = mesh.cell_facets(0).iter().position(|&f| f == shared).unwrap();
    let diagonal = local[(local_index, local_index)];
    let other_index = mesh.cell_facets(1).iter().position(|&f| f == shared).unwrap();
    assert_eq!(dense[(shared, shared)], diagonal + local[(other_index, other_index)]);

    // Entries outside the pattern are rejected
    let mut dg_matrix: CsrMatrix<f64> = zero_csr_from_pattern(assemble_pattern(&dg0, &dg0).unwrap()).unwrap();
    assert!(add_local_matrix_to_csr(&mut dg_matrix, &[0], &[1], &DMatrix::from_element(1, 1, 1.0)).is_err());

    let mut vector = DVector::<f64>::zeros(5);
    add_local_vector(&mut (&mut vector).into(), &[4, 1], &DVector::from_column_slice(&[1.0, 2.0]));
    add_local_vector(&mut (&mut vector).into(), &[1], &DVector::from_column_slice(&[0.5]));
    assert_eq!(vector, DVector::from_column_slice(&[0.0, 2.5, 0.0, 0.0, 1.0]));
}

fn laplacian_1d(n: usize) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(n, n);
    for i in 0..n {
        coo.push(i, i, 2.0);
        if i > 0 {
            coo.push(i, i - 1, -1.0);
        }
        if i + 1 < n {
            coo.push(i, i + 1, -1.0);
        }
    }
    CsrMatrix::from(&coo)
}

#[test]
fn dirichlet_conditions_zero_rows_and_columns() {
    let mut matrix = laplacian_1d(5);
    apply_homogeneous_dirichlet_bc_csr(&mut matrix, &[0, 4]);
    let dense = DMatrix::from(&matrix);
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(
        5,
        5,
        &[
            2.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 2.0, -1.0, 0.0, 0.0,
            0.0, -1.0, 2.0, -1.0, 0.0,
            0.0, 0.0, -1.0, 2.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 2.0,
        ],
    );
    assert_eq!(dense, expected);
    assert_eq!(matrix.nnz(), laplacian_1d(5).nnz());

    let mut rhs = DVector::from_element(5, 1.0);
    apply_homogeneous_dirichlet_bc_rhs(&mut rhs, &[0, 4]);
    assert_eq!(rhs, DVector::from_column_slice(&[0.0, 1.0, 1.0, 1.0, 0.0]));
}

#[test]
fn boundary_condition_constrains_boundary_facet_dofs() {
    let mesh = unit_square(2);
    let trace = space(&mesh, ElementFamily::HDivTrace, 1);
    let bc = DirichletBc::on_boundary(Arc::clone(&trace));
    assert!(Arc::ptr_eq(bc.space(), &trace));
    assert_eq!(bc.dofs().len(), 2 * mesh.boundary_facets().len());
    assert!(bc.dofs().windows(2).all(|w| w[0] < w[1]));
    for &facet_index in mesh.boundary_facets() {
        for dof in trace.facet_dofs(facet_index) {
            assert!(bc.dofs().binary_search(&dof).is_ok());
        }
    }

    let mut vector = DVector::from_element(trace.num_dofs(), 3.0);
    bc.apply_to_vector(&mut vector);
    let constrained = vector.iter().filter(|&&v| v == 0.0).count();
    assert_eq!(constrained, bc.dofs().len());
}
