use crate::{space, unit_square};
use hybridization::element::{ElementFamily, FiniteElement, SobolevSpace};
use hybridization::quadrature::{map_segment_rule, segment_rule, Quadrature};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, Point2, Vector2};
use ElementFamily::*;

#[test]
fn dof_counts() {
    let expected = [
        (RaviartThomas, 1, 3),
        (RaviartThomas, 2, 8),
        (RaviartThomas, 3, 15),
        (BrezziDouglasMarini, 1, 6),
        (BrezziDouglasMarini, 2, 12),
        (Nedelec, 1, 3),
        (Nedelec, 2, 8),
        (DiscontinuousLagrange, 0, 1),
        (DiscontinuousLagrange, 1, 3),
        (DiscontinuousLagrange, 2, 6),
        (HDivTrace, 0, 3),
        (HDivTrace, 2, 9),
    ];
    for (family, degree, num_dofs) in expected {
        let element = FiniteElement::new(family, degree).unwrap();
        assert_eq!(element.num_cell_dofs(), num_dofs, "{}{}", family, degree);
        assert_eq!(
            element.num_cell_dofs(),
            3 * element.num_facet_dofs() + element.num_interior_dofs()
        );
    }
}

#[test]
fn element_properties() {
    let rt = FiniteElement::new(RaviartThomas, 1).unwrap();
    assert!(rt.is_vector_valued());
    assert_eq!(rt.value_dim(), 2);
    assert_eq!(rt.sobolev_space(), SobolevSpace::HDiv);
    assert_eq!(FiniteElement::new(Nedelec, 1).unwrap().sobolev_space(), SobolevSpace::HCurl);
    assert_eq!(
        FiniteElement::new(DiscontinuousLagrange, 0).unwrap().sobolev_space(),
        SobolevSpace::L2
    );
    let trace = FiniteElement::new(HDivTrace, 1).unwrap();
    assert_eq!(trace.sobolev_space(), SobolevSpace::Trace);
    assert!(!trace.is_vector_valued());

    assert!(FiniteElement::new(RaviartThomas, 0).is_err());
    assert!(FiniteElement::new(BrezziDouglasMarini, 0).is_err());
    assert!(FiniteElement::new(Nedelec, 0).is_err());

    assert_eq!(RaviartThomas.to_string(), "RT");
    assert_eq!(BrezziDouglasMarini.to_string(), "BDM");
    assert_eq!(Nedelec.to_string(), "N1curl");
    assert_eq!(DiscontinuousLagrange.to_string(), "DG");
    assert_eq!(HDivTrace.to_string(), "HDiv Trace");
}

/// Applies the facet degree-of-freedom functionals of the element to its basis on a cell.
fn facet_moments(family: ElementFamily, degree: usize, cell_index: usize) -> DMatrix<f64> {
    let mesh = unit_square(2);
    let element = FiniteElement::new(family, degree).unwrap();
    let basis = element.cell_basis(&mesh, cell_index).unwrap();
    let per_facet = element.num_facet_dofs();
    let rule = segment_rule::<f64>(2 * degree + 2);

    let mut moments = DMatrix::zeros(3 * per_facet, element.num_cell_dofs());
    for (local_facet, &facet_index) in mesh.cell_facets(cell_index).iter().enumerate() {
        let [a, b] = mesh.facet_endpoints(facet_index);
        let direction = match family {
            Nedelec => mesh.facet_tangent(facet_index),
            _ => mesh.facet_normal(facet_index),
        };
        let length = mesh.facet_length(facet_index);
        let (weights, points, params) = map_segment_rule(&rule, &a, &b);
        for m in 0..per_facet {
            let row = local_facet * per_facet + m;
            for ((w, x), s) in weights.iter().zip(&points).zip(&params) {
                let values = basis.values(x).unwrap();
                for j in 0..element.num_cell_dofs() {
                    let component = values[(j, 0)] * direction.x + values[(j, 1)] * direction.y;
                    moments[(row, j)] += w * component * s.powi(m as i32) / length;
                }
            }
        }
    }
    moments
}

#[test]
fn facet_functionals_are_dual_to_basis() {
    let cases = [
        (RaviartThomas, 1),
        (RaviartThomas, 2),
        (RaviartThomas, 3),
        (BrezziDouglasMarini, 1),
        (BrezziDouglasMarini, 2),
        (Nedelec, 1),
        (Nedelec, 2),
    ];
    for (family, degree) in cases {
        for cell_index in [0, 3, 6] {
            let moments = facet_moments(family, degree, cell_index);
            let num_facet_dofs = moments.nrows();
            let mut expected = DMatrix::<f64>::zeros(num_facet_dofs, moments.ncols());
            expected
                .view_mut((0, 0), (num_facet_dofs, num_facet_dofs))
                .fill_with_identity();
            assert_matrix_eq!(moments, expected, comp = abs, tol = 1e-10);
        }
    }
}

#[test]
fn raviart_thomas_divergence_matches_facet_flux() {
    let mesh = unit_square(2);
    let element = FiniteElement::new(RaviartThomas, 1).unwrap();
    for cell_index in 0..mesh.num_cells() {
        let basis = element.cell_basis(&mesh, cell_index).unwrap();
        let divergences = basis.divergences(&mesh.cell_centroid(cell_index)).unwrap();
        for (local_facet, &facet_index) in mesh.cell_facets(cell_index).iter().enumerate() {
            let orientation = mesh
                .facet_normal(facet_index)
                .dot(&mesh.outward_normal(cell_index, local_facet));
            let expected = orientation * mesh.facet_length(facet_index);
            assert_scalar_eq!(
                divergences[local_facet] * mesh.cell_area(cell_index),
                expected,
                comp = abs,
                tol = 1e-12
            );
        }
    }
}

#[test]
fn lowest_order_dg_basis_is_constant_one() {
    let mesh = unit_square(1);
    let basis = FiniteElement::new(DiscontinuousLagrange, 0)
        .unwrap()
        .cell_basis(&mesh, 1)
        .unwrap();
    let values = basis.values(&Point2::new(0.3, 0.6)).unwrap();
    assert_eq!(values.shape(), (1, 1));
    assert_scalar_eq!(values[(0, 0)], 1.0, comp = abs, tol = 1e-14);
    assert!(basis.divergences(&Point2::new(0.3, 0.6)).is_err());
}

#[test]
fn trace_basis_is_lagrange_on_each_facet() {
    let mesh = unit_square(1);
    let basis = FiniteElement::new(HDivTrace, 1)
        .unwrap()
        .cell_basis(&mesh, 0)
        .unwrap();
    let x = Point2::new(0.5, 0.5);
    assert!(basis.values(&x).is_err());

    let values = basis.facet_values(2, 0.25, &x).unwrap();
    assert_eq!(values.shape(), (6, 1));
    let expected = DMatrix::from_column_slice(6, 1, &[0.0, 0.0, 0.0, 0.0, 0.75, 0.25]);
    assert_matrix_eq!(values, expected, comp = abs, tol = 1e-14);
}

/// Checks that the given component of conforming basis functions agrees across interior
/// facets.
fn assert_facet_continuity(family: ElementFamily, degree: usize) {
    let mesh = unit_square(2);
    let space = space(&mesh, family, degree);
    let per_facet = space.element().num_facet_dofs();

    for facet_index in (0..mesh.num_facets()).filter(|&f| !mesh.is_boundary_facet(f)) {
        let neighbors = mesh.facet_neighbors(facet_index);
        let [a, b] = mesh.facet_endpoints(facet_index);
        let direction: Vector2<f64> = match family {
            Nedelec => mesh.facet_tangent(facet_index),
            _ => mesh.facet_normal(facet_index),
        };
        let global_dofs = space.facet_dofs(facet_index);

        for s in [0.1, 0.5, 0.85] {
            let x = a + (b - a) * s;
            let components: Vec<Vec<f64>> = neighbors
                .iter()
                .map(|(cell_index, local_facet)| {
                    let values = space.cell_basis(cell_index).values(&x).unwrap();
                    (0..per_facet)
                        .map(|m| {
                            let local = local_facet * per_facet + m;
                            assert_eq!(space.cell_dofs(cell_index)[local], global_dofs[m]);
                            values[(local, 0)] * direction.x + values[(local, 1)] * direction.y
                        })
                        .collect()
                })
                .collect();
            for m in 0..per_facet {
                assert_scalar_eq!(components[0][m], components[1][m], comp = abs, tol = 1e-10);
            }
        }
    }
}

#[test]
fn conforming_bases_are_continuous_across_facets() {
    assert_facet_continuity(RaviartThomas, 1);
    assert_facet_continuity(RaviartThomas, 2);
    assert_facet_continuity(BrezziDouglasMarini, 1);
    assert_facet_continuity(BrezziDouglasMarini, 2);
    assert_facet_continuity(Nedelec, 1);
}

#[test]
fn quadrature_rule_weights_are_positive() {
    let rule = segment_rule::<f64>(7);
    assert!(rule.weights().iter().all(|&w| w > 0.0));
}
