use crate::aabb::Aabb3d;
use crate::grid::{Grid2d, GridShapeError, Lattice};
use nalgebra::Vector3;

/// A triangle mesh in 3D with per-vertex colors
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriMesh3d {
    /// Coordinates of all vertices of the mesh
    pub vertices: Vec<Vector3<f64>>,
    /// The triangles of the mesh identified by their vertex indices
    pub triangles: Vec<[usize; 3]>,
    /// RGB color in `[0, 1]` of every vertex, either empty or parallel to `vertices`
    pub vertex_colors: Vec<Vector3<f64>>,
}

impl TriMesh3d {
    /// Returns whether all triangle indices are valid and the colors match the vertices
    pub fn is_consistent(&self) -> bool {
        let n = self.vertices.len();
        (self.vertex_colors.is_empty() || self.vertex_colors.len() == n)
            && self.triangles.iter().all(|tri| tri.iter().all(|&v| v < n))
    }

    /// Returns whether vertex colors are present
    pub fn has_colors(&self) -> bool {
        !self.vertex_colors.is_empty()
    }

    /// Returns the bounding box of the vertices, `None` for an empty mesh
    pub fn bounds(&self) -> Option<Aabb3d> {
        Aabb3d::par_from_points(&self.vertices)
    }
}

/// Linear color ramps mapping a normalized scalar `v` in `[0, 1]` to RGB
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColorRamp {
    /// `(v, 0.2, 1 - v)`
    Surface,
    /// `(v, 0.3 * (1 - v), 1 - v)`
    Slice,
}

impl ColorRamp {
    #[inline(always)]
    pub fn color(&self, v: f64) -> Vector3<f64> {
        match self {
            ColorRamp::Surface => Vector3::new(v, 0.2, 1.0 - v),
            ColorRamp::Slice => Vector3::new(v, 0.3 * (1.0 - v), 1.0 - v),
        }
    }
}

/// Source of the vertex heights of a grid mesh
#[derive(Copy, Clone, Debug)]
pub enum Elevation<'a> {
    /// Height of every node taken from a grid on the same lattice
    Grid(&'a Grid2d),
    /// All vertices at the same height
    Constant(f64),
}

/// Builds a colored triangle mesh with one vertex per lattice node and two triangles per cell
///
/// The scalar grid is normalized to `[0, 1]` and mapped through the color ramp. Vertex `idx = i * cols + j`
/// is located at `(x_j, y_i, elevation)`. Cell `(i, j)` is split into the triangles
/// `(i,j), (i,j+1), (i+1,j)` and `(i,j+1), (i+1,j+1), (i+1,j)`.
pub fn assemble_grid_mesh(
    lattice: &Lattice,
    elevation: Elevation,
    scalar: &Grid2d,
    ramp: ColorRamp,
) -> Result<TriMesh3d, GridShapeError> {
    let (rows, cols) = (lattice.rows(), lattice.cols());
    if rows < 2 || cols < 2 {
        return Err(GridShapeError::TooSmall { rows, cols });
    }
    scalar.check_shape(lattice)?;
    if let Elevation::Grid(grid) = elevation {
        grid.check_shape(lattice)?;
    }

    let normalized = scalar.normalized();

    let mut vertices = Vec::with_capacity(rows * cols);
    let mut vertex_colors = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        for j in 0..cols {
            let node = lattice.node(i, j);
            let z = match elevation {
                Elevation::Grid(grid) => grid.get(i, j),
                Elevation::Constant(z) => z,
            };
            vertices.push(Vector3::new(node.x, node.y, z));
            vertex_colors.push(ramp.color(normalized.get(i, j)));
        }
    }

    let mut triangles = Vec::with_capacity(2 * (rows - 1) * (cols - 1));
    for i in 0..rows - 1 {
        for j in 0..cols - 1 {
            let idx = i * cols + j;
            triangles.push([idx, idx + 1, idx + cols]);
            triangles.push([idx + 1, idx + cols + 1, idx + cols]);
        }
    }

    Ok(TriMesh3d {
        vertices,
        triangles,
        vertex_colors,
    })
}
