use crate::connectivity::{Connectivity, Segment2d2Connectivity, Tri3d2Connectivity};
use crate::Real;
use eyre::eyre;
use nalgebra::{Point2, Scalar, Vector2};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

pub mod procedural;

/// The cells on either side of a facet, as `(cell index, local facet index)` pairs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetNeighbors {
    pub first: (usize, usize),
    /// `None` for boundary facets.
    pub second: Option<(usize, usize)>,
}

impl FacetNeighbors {
    pub fn is_boundary(&self) -> bool {
        self.second.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> {
        std::iter::once(self.first).chain(self.second)
    }
}

/// Facet numbering and cell-facet incidence of a triangle mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FacetTopology {
    /// Facets with vertex indices in increasing order.
    facets: Vec<Segment2d2Connectivity>,
    cell_facets: Vec<[usize; 3]>,
    facet_neighbors: Vec<FacetNeighbors>,
    boundary_facets: Vec<usize>,
}

impl FacetTopology {
    /// Numbers facets in order of first appearance when visiting cells and their local facets
    /// in order, so that the numbering is deterministic.
    fn from_connectivity(connectivity: &[Tri3d2Connectivity]) -> eyre::Result<Self> {
        let mut facet_lookup = FxHashMap::default();
        let mut facets = Vec::new();
        let mut cell_facets = Vec::with_capacity(connectivity.len());
        let mut facet_neighbors: Vec<FacetNeighbors> = Vec::new();

        for (cell_index, cell) in connectivity.iter().enumerate() {
            let mut local_to_global = [usize::MAX; 3];
            for local_index in 0..cell.num_facets() {
                let facet = cell
                    .get_facet_connectivity(local_index)
                    .ok_or_else(|| eyre!("triangle has no facet {}", local_index))?
                    .sorted();
                let global_index = *facet_lookup.entry(facet).or_insert_with(|| {
                    facets.push(facet);
                    facets.len() - 1
                });
                if global_index == facet_neighbors.len() {
                    facet_neighbors.push(FacetNeighbors {
                        first: (cell_index, local_index),
                        second: None,
                    });
                } else {
                    let neighbors = &mut facet_neighbors[global_index];
                    if neighbors.second.is_some() {
                        return Err(eyre!(
                            "facet {:?} is shared by more than two cells (non-manifold mesh)",
                            facet.0
                        ));
                    }
                    neighbors.second = Some((cell_index, local_index));
                }
                local_to_global[local_index] = global_index;
            }
            cell_facets.push(local_to_global);
        }

        let boundary_facets = facet_neighbors
            .iter()
            .enumerate()
            .filter(|(_, neighbors)| neighbors.is_boundary())
            .map(|(index, _)| index)
            .collect();

        Ok(Self {
            facets,
            cell_facets,
            facet_neighbors,
            boundary_facets,
        })
    }
}

/// Conforming triangle mesh in two dimensions with facet topology.
///
/// Every facet carries a global orientation: its tangent points from the vertex with the lower
/// index to the vertex with the higher index, and its normal is the tangent rotated clockwise.
/// Degrees of freedom attached to facets are defined with respect to this orientation, so that
/// all cells sharing a facet agree on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Mesh2d<T: Scalar> {
    vertices: Vec<Point2<T>>,
    connectivity: Vec<Tri3d2Connectivity>,
    topology: FacetTopology,
    layers: Option<usize>,
}

impl<T: Real> Mesh2d<T> {
    /// Construct a mesh from vertices and connectivity.
    ///
    /// Fails if the connectivity references vertices out of bounds, contains degenerate
    /// triangles or facets shared by more than two cells.
    pub fn from_vertices_and_connectivity(
        vertices: Vec<Point2<T>>,
        connectivity: Vec<Tri3d2Connectivity>,
    ) -> eyre::Result<Self> {
        for (cell_index, cell) in connectivity.iter().enumerate() {
            let [a, b, c] = cell
                .vertices(&vertices)
                .ok_or_else(|| eyre!("cell {} references vertices out of bounds", cell_index))?;
            let area = (b - a).perp(&(c - a)).abs();
            if area <= T::default_epsilon() * (b - a).norm_squared().max((c - a).norm_squared()) {
                return Err(eyre!("cell {} is degenerate", cell_index));
            }
        }
        let topology = FacetTopology::from_connectivity(&connectivity)?;
        Ok(Self {
            vertices,
            connectivity,
            topology,
            layers: None,
        })
    }

    /// Marks the mesh as the base of an extruded mesh with the given number of layers.
    ///
    /// Extruded meshes can be described, but the finite element layer does not discretize
    /// them.
    pub fn extruded(self, layers: usize) -> Self {
        Self {
            layers: Some(layers),
            ..self
        }
    }

    pub fn is_extruded(&self) -> bool {
        self.layers.is_some()
    }

    pub fn layers(&self) -> Option<usize> {
        self.layers
    }

    pub fn vertices(&self) -> &[Point2<T>] {
        &self.vertices
    }

    pub fn connectivity(&self) -> &[Tri3d2Connectivity] {
        &self.connectivity
    }

    pub fn num_cells(&self) -> usize {
        self.connectivity.len()
    }

    pub fn num_facets(&self) -> usize {
        self.topology.facets.len()
    }

    /// Facets with vertex indices sorted in increasing order.
    pub fn facets(&self) -> &[Segment2d2Connectivity] {
        &self.topology.facets
    }

    /// Global facet indices of the local facets of the given cell.
    pub fn cell_facets(&self, cell_index: usize) -> &[usize; 3] {
        &self.topology.cell_facets[cell_index]
    }

    pub fn facet_neighbors(&self, facet_index: usize) -> &FacetNeighbors {
        &self.topology.facet_neighbors[facet_index]
    }

    /// Sorted indices of the facets that belong to only one cell.
    pub fn boundary_facets(&self) -> &[usize] {
        &self.topology.boundary_facets
    }

    pub fn is_boundary_facet(&self, facet_index: usize) -> bool {
        self.topology.facet_neighbors[facet_index].is_boundary()
    }

    pub fn cell_vertices(&self, cell_index: usize) -> [Point2<T>; 3] {
        let [a, b, c] = self.connectivity[cell_index].0;
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    pub fn cell_area(&self, cell_index: usize) -> T {
        let [a, b, c] = self.cell_vertices(cell_index);
        (b - a).perp(&(c - a)).abs() / (T::one() + T::one())
    }

    pub fn cell_centroid(&self, cell_index: usize) -> Point2<T> {
        let [a, b, c] = self.cell_vertices(cell_index);
        let three = T::one() + T::one() + T::one();
        Point2::from((a.coords + b.coords + c.coords) / three)
    }

    /// Length of the longest edge of the cell.
    pub fn cell_diameter(&self, cell_index: usize) -> T {
        let [a, b, c] = self.cell_vertices(cell_index);
        (b - a).norm().max((c - b).norm()).max((a - c).norm())
    }

    /// Facet end points in the facet's global orientation (lower vertex index first).
    pub fn facet_endpoints(&self, facet_index: usize) -> [Point2<T>; 2] {
        let [a, b] = self.topology.facets[facet_index].0;
        [self.vertices[a], self.vertices[b]]
    }

    pub fn facet_length(&self, facet_index: usize) -> T {
        let [a, b] = self.facet_endpoints(facet_index);
        (b - a).norm()
    }

    /// Unit tangent in the facet's global orientation.
    pub fn facet_tangent(&self, facet_index: usize) -> Vector2<T> {
        let [a, b] = self.facet_endpoints(facet_index);
        (b - a).normalize()
    }

    /// Unit normal in the facet's global orientation, i.e. the tangent rotated clockwise.
    pub fn facet_normal(&self, facet_index: usize) -> Vector2<T> {
        let t = self.facet_tangent(facet_index);
        Vector2::new(t.y, -t.x)
    }

    /// Unit normal of the given local facet pointing out of the cell.
    pub fn outward_normal(&self, cell_index: usize, local_facet: usize) -> Vector2<T> {
        let facet_index = self.topology.cell_facets[cell_index][local_facet];
        let n = self.facet_normal(facet_index);
        let [a, _] = self.facet_endpoints(facet_index);
        let opposite = self.vertices[self.connectivity[cell_index].opposite_vertex(local_facet)];
        if n.dot(&(opposite - a)) > T::zero() {
            -n
        } else {
            n
        }
    }
}
