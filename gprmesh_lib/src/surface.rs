use crate::aabb::Aabb2d;
use crate::grid::{
    FillValue, GridShapeError, InterpolationOutcome, Lattice, ScalarField, gaussian_smooth,
    interpolate_linear,
};
use crate::mesh::{ColorRamp, Elevation, TriMesh3d, assemble_grid_mesh};
use crate::normalize::PointSet;
use crate::settings::SMOOTHING_SIGMA;
use log::info;
use nalgebra::Vector2;

/// Elevation surface over the horizontal extent of a point set, colored by amplitude
#[derive(Clone, Debug)]
pub struct SurfaceMesh {
    pub mesh: TriMesh3d,
    /// Number of lattice nodes per axis
    pub resolution: usize,
    /// Lattice extent along x
    pub x_range: [f64; 2],
    /// Lattice extent along y
    pub y_range: [f64; 2],
    /// Range of the smoothed elevation
    pub z_range: [f64; 2],
    pub outcome: InterpolationOutcome,
}

/// Interpolates elevation and absolute amplitude of the points onto a `resolution x resolution`
/// lattice, smooths both grids and assembles the colored surface mesh
///
/// Lattice nodes outside of the convex hull of the points get the mean elevation and zero amplitude.
pub fn generate_surface_mesh(
    points: &PointSet,
    resolution: usize,
) -> Result<SurfaceMesh, GridShapeError> {
    let bounds = points.horizontal_bounds().unwrap_or_else(Aabb2d::zeros);
    let lattice = Lattice::new(&bounds, resolution);

    let positions = points
        .iter()
        .map(|p| p.horizontal())
        .collect::<Vec<Vector2<f64>>>();
    let elevation = points.iter().map(|p| p.position.z).collect::<Vec<_>>();
    let amplitude = points.abs_amplitudes();

    let interpolated = interpolate_linear(
        &positions,
        &[
            ScalarField::new(&elevation, FillValue::Mean),
            ScalarField::new(&amplitude, FillValue::Constant(0.0)),
        ],
        &lattice,
    );
    let [elevation_grid, amplitude_grid] = [&interpolated.grids[0], &interpolated.grids[1]]
        .map(|grid| gaussian_smooth(grid, SMOOTHING_SIGMA));

    let mesh = assemble_grid_mesh(
        &lattice,
        Elevation::Grid(&elevation_grid),
        &amplitude_grid,
        ColorRamp::Surface,
    )?;

    let (z_min, z_max) = elevation_grid.min_max().unwrap_or((0.0, 0.0));
    info!(
        "Generated surface mesh with {} vertices and {} triangles",
        mesh.vertices.len(),
        mesh.triangles.len()
    );

    Ok(SurfaceMesh {
        mesh,
        resolution,
        x_range: [bounds.min().x, bounds.max().x],
        y_range: [bounds.min().y, bounds.max().y],
        z_range: [z_min, z_max],
        outcome: interpolated.outcome,
    })
}
