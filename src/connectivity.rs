use nalgebra::{Point2, Scalar};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

/// Vertex-index connectivity of a cell, with access to its facets.
pub trait Connectivity: Clone {
    type FacetConnectivity: Connectivity;

    fn num_facets(&self) -> usize;

    fn get_facet_connectivity(&self, index: usize) -> Option<Self::FacetConnectivity>;

    fn vertex_indices(&self) -> &[usize];
}

/// Connectivity of a two-vertex segment, used for the facets of triangles.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Segment2d2Connectivity(pub [usize; 2]);

impl Segment2d2Connectivity {
    /// The connectivity with vertices ordered by increasing global index.
    ///
    /// This is the orientation shared by all cells adjacent to the facet.
    pub fn sorted(&self) -> Self {
        let [a, b] = self.0;
        Self([a.min(b), a.max(b)])
    }
}

impl Connectivity for Segment2d2Connectivity {
    type FacetConnectivity = ();

    fn num_facets(&self) -> usize {
        0
    }

    fn get_facet_connectivity(&self, _index: usize) -> Option<Self::FacetConnectivity> {
        None
    }

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }
}

impl Connectivity for () {
    type FacetConnectivity = ();

    fn num_facets(&self) -> usize {
        0
    }

    fn get_facet_connectivity(&self, _index: usize) -> Option<Self::FacetConnectivity> {
        None
    }

    fn vertex_indices(&self) -> &[usize] {
        &[]
    }
}

/// Connectivity for a linear triangle in two dimensions.
///
/// Local facet `i` connects vertex `i` to vertex `(i + 1) % 3`:
///
/// ```text
/// 2
/// |`\
/// |  `\
/// 2    `1
/// |      `\
/// |        `\
/// 0----0-----1
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Tri3d2Connectivity(pub [usize; 3]);

impl Tri3d2Connectivity {
    /// The vertex opposite to the given local facet.
    pub fn opposite_vertex(&self, local_facet: usize) -> usize {
        self.0[(local_facet + 2) % 3]
    }

    pub fn vertices<T: Scalar>(&self, vertices: &[Point2<T>]) -> Option<[Point2<T>; 3]> {
        Some([
            vertices.get(self.0[0]).cloned()?,
            vertices.get(self.0[1]).cloned()?,
            vertices.get(self.0[2]).cloned()?,
        ])
    }
}

impl Connectivity for Tri3d2Connectivity {
    type FacetConnectivity = Segment2d2Connectivity;

    fn num_facets(&self) -> usize {
        3
    }

    fn get_facet_connectivity(&self, index: usize) -> Option<Self::FacetConnectivity> {
        let idx = &self.0;
        if index < 3 {
            Some(Segment2d2Connectivity([idx[index], idx[(index + 1) % 3]]))
        } else {
            None
        }
    }

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }
}

impl Deref for Tri3d2Connectivity {
    type Target = [usize; 3];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Tri3d2Connectivity {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
