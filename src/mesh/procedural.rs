//! Basic procedural mesh generation routines.
use crate::connectivity::Tri3d2Connectivity;
use crate::mesh::Mesh2d;
use crate::Real;
use nalgebra::{convert, Point2, Vector2};

/// Uniform triangle mesh of the unit square `[0, 1]^2`.
///
/// Each of the `cells_per_dim x cells_per_dim` squares is split into two triangles along the
/// diagonal from its bottom-left to its top-right corner.
pub fn create_unit_square_uniform_tri_mesh_2d<T>(cells_per_dim: usize) -> eyre::Result<Mesh2d<T>>
where
    T: Real,
{
    create_rectangular_uniform_tri_mesh_2d(T::one(), 1, 1, cells_per_dim, &Vector2::new(T::zero(), T::one()))
}

/// Generates an axis-aligned rectangular uniform triangle mesh given a unit length,
/// dimensions as multipliers of the unit length and the number of cells per unit length.
///
/// Vertices are numbered row by row, starting at the top-left corner.
pub fn create_rectangular_uniform_tri_mesh_2d<T>(
    unit_length: T,
    units_x: usize,
    units_y: usize,
    cells_per_unit: usize,
    top_left: &Vector2<T>,
) -> eyre::Result<Mesh2d<T>>
where
    T: Real,
{
    if cells_per_unit == 0 || units_x == 0 || units_y == 0 {
        return Mesh2d::from_vertices_and_connectivity(Vec::new(), Vec::new());
    }

    let cell_size = unit_length / convert::<f64, T>(cells_per_unit as f64);
    let num_cells_x = units_x * cells_per_unit;
    let num_cells_y = units_y * cells_per_unit;

    let to_global_vertex_index = |i, j| (num_cells_x + 1) * j + i;

    let mut vertices = Vec::with_capacity((num_cells_x + 1) * (num_cells_y + 1));
    for j in 0..=num_cells_y {
        for i in 0..=num_cells_x {
            let offset = Vector2::new(convert::<f64, T>(i as f64), -convert::<f64, T>(j as f64)) * cell_size;
            vertices.push(Point2::from(top_left + offset));
        }
    }

    let mut cells = Vec::with_capacity(2 * num_cells_x * num_cells_y);
    for j in 0..num_cells_y {
        for i in 0..num_cells_x {
            let bottom_left = to_global_vertex_index(i, j + 1);
            let bottom_right = to_global_vertex_index(i + 1, j + 1);
            let top_right = to_global_vertex_index(i + 1, j);
            let top_left = to_global_vertex_index(i, j);
            cells.push(Tri3d2Connectivity([bottom_left, bottom_right, top_right]));
            cells.push(Tri3d2Connectivity([bottom_left, top_right, top_left]));
        }
    }

    Mesh2d::from_vertices_and_connectivity(vertices, cells)
}
