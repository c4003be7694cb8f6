//! Horizontal depth slices through a point cloud
//!
//! Slice depths are spaced evenly between the shallowest and the deepest point, excluding both.
//! Every slice collects the points within half a slice spacing of its depth and interpolates their
//! absolute amplitude onto a lattice spanning the whole point cloud. Slices with too few points
//! are skipped.

use crate::aabb::{Aabb2d, Aabb3d};
use crate::grid::{
    FillValue, GridShapeError, InterpolationOutcome, Lattice, ScalarField, gaussian_smooth,
    interpolate_linear, linspace,
};
use crate::mesh::{ColorRamp, Elevation, TriMesh3d, assemble_grid_mesh};
use crate::normalize::PointSet;
use crate::settings::{MIN_SLICE_POINTS, SLICE_RESOLUTION, SMOOTHING_SIGMA};
use log::{debug, info};
use nalgebra::Vector2;
use rayon::prelude::*;

/// A flat mesh at a fixed depth colored by the amplitude of the nearby points
#[derive(Clone, Debug)]
pub struct SliceMesh {
    pub mesh: TriMesh3d,
    /// Index of the slice among the requested depths, starting at the shallowest
    pub depth_index: usize,
    pub depth: f64,
    /// Number of points inside of the depth window
    pub point_count: usize,
    pub bounds: Aabb3d,
    pub outcome: InterpolationOutcome,
}

/// A requested depth that did not produce a slice
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SkippedSlice {
    pub depth_index: usize,
    pub depth: f64,
    pub point_count: usize,
}

/// Result of the slice generation
#[derive(Clone, Debug, Default)]
pub struct DepthSlices {
    /// Produced slices ordered from shallow to deep
    pub slices: Vec<SliceMesh>,
    /// Depths with fewer than the minimum number of points
    pub skipped: Vec<SkippedSlice>,
}

/// Returns `count` depths evenly spaced strictly between `z_max` and `z_min`, shallowest first
pub fn slice_depths(z_min: f64, z_max: f64, count: usize) -> Vec<f64> {
    let depths = linspace(z_max, z_min, count + 2);
    depths[1..depths.len() - 1].to_vec()
}

/// Generates up to `count` depth slices through the points
pub fn generate_depth_slices(
    points: &PointSet,
    count: usize,
) -> Result<DepthSlices, GridShapeError> {
    let (Some(bounds), true) = (points.bounds(), count > 0) else {
        return Ok(DepthSlices::default());
    };

    let (z_min, z_max) = (bounds.min().z, bounds.max().z);
    let tolerance = (z_max - z_min) / (count * 2) as f64;
    let horizontal = Aabb2d::new(bounds.min().xy(), bounds.max().xy());
    let lattice = Lattice::new(&horizontal, SLICE_RESOLUTION);

    let results = slice_depths(z_min, z_max, count)
        .into_par_iter()
        .enumerate()
        .map(|(depth_index, depth)| {
            let window = points.select(|p| (p.position.z - depth).abs() < tolerance);
            if window.len() < MIN_SLICE_POINTS {
                return Ok(Err(SkippedSlice {
                    depth_index,
                    depth,
                    point_count: window.len(),
                }));
            }
            generate_slice(&window, &lattice, depth_index, depth).map(Ok)
        })
        .collect::<Result<Vec<_>, GridShapeError>>()?;

    let mut slices = DepthSlices::default();
    for result in results {
        match result {
            Ok(slice) => {
                debug!(
                    "Slice at depth {:.3}: {} points, {} vertices",
                    slice.depth,
                    slice.point_count,
                    slice.mesh.vertices.len()
                );
                slices.slices.push(slice);
            }
            Err(skipped) => {
                info!(
                    "Skipping depth slice at {:.3}: only {} points within {:.3} (at least {} required)",
                    skipped.depth, skipped.point_count, tolerance, MIN_SLICE_POINTS
                );
                slices.skipped.push(skipped);
            }
        }
    }

    Ok(slices)
}

fn generate_slice(
    window: &PointSet,
    lattice: &Lattice,
    depth_index: usize,
    depth: f64,
) -> Result<SliceMesh, GridShapeError> {
    let positions = window
        .iter()
        .map(|p| p.horizontal())
        .collect::<Vec<Vector2<f64>>>();
    let amplitude = window.abs_amplitudes();

    let interpolated = interpolate_linear(
        &positions,
        &[ScalarField::new(&amplitude, FillValue::Constant(0.0))],
        lattice,
    );
    let amplitude_grid = gaussian_smooth(&interpolated.grids[0], SMOOTHING_SIGMA);

    let mesh = assemble_grid_mesh(
        lattice,
        Elevation::Constant(depth),
        &amplitude_grid,
        ColorRamp::Slice,
    )?;
    let bounds = mesh.bounds().unwrap_or_else(Aabb3d::zeros);

    Ok(SliceMesh {
        mesh,
        depth_index,
        depth,
        point_count: window.len(),
        bounds,
        outcome: interpolated.outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::SurveyPoint;

    fn layered_points(depths: &[(f64, usize)]) -> PointSet {
        let mut points = Vec::new();
        for &(z, n) in depths {
            for k in 0..n {
                let t = k as f64;
                points.push(SurveyPoint::new(
                    (t * 0.618).fract() * 4.0,
                    (t * 0.414).fract() * 2.0,
                    z,
                    1.0 + t,
                ));
            }
        }
        PointSet::new(points)
    }

    #[test]
    fn test_slice_depths_exclude_endpoints() {
        let depths = slice_depths(-6.0, 0.0, 2);
        assert_eq!(depths, vec![-2.0, -4.0]);
        assert!(slice_depths(-1.0, 0.0, 0).is_empty());
    }

    #[test]
    fn test_all_slices_generated() {
        // Depths -1, -2, -3 with z range [-4, 0] and three slices
        let points = layered_points(&[(0.0, 3), (-1.0, 30), (-2.0, 30), (-3.0, 30), (-4.0, 3)]);
        let slices = generate_depth_slices(&points, 3).unwrap();

        assert!(slices.skipped.is_empty());
        let depths = slices.slices.iter().map(|s| s.depth).collect::<Vec<_>>();
        assert_eq!(depths, vec![-1.0, -2.0, -3.0]);
        for slice in &slices.slices {
            assert_eq!(slice.point_count, 30);
            assert_eq!(slice.mesh.vertices.len(), SLICE_RESOLUTION * SLICE_RESOLUTION);
            assert_eq!(
                slice.mesh.triangles.len(),
                2 * (SLICE_RESOLUTION - 1) * (SLICE_RESOLUTION - 1)
            );
            assert!(slice.mesh.vertices.iter().all(|v| v.z == slice.depth));
            assert_eq!(slice.bounds.min().z, slice.depth);
        }
    }

    #[test]
    fn test_sparse_window_is_skipped() {
        let points = layered_points(&[(0.0, 3), (-1.0, 30), (-2.0, 9), (-3.0, 30), (-4.0, 3)]);
        let slices = generate_depth_slices(&points, 3).unwrap();

        assert_eq!(slices.slices.len(), 2);
        assert_eq!(slices.skipped.len(), 1);
        assert_eq!(slices.skipped[0].depth_index, 1);
        assert_eq!(slices.skipped[0].point_count, 9);
        assert_eq!(slices.slices[1].depth_index, 2);
    }

    #[test]
    fn test_flat_point_cloud_has_no_slices() {
        let points = layered_points(&[(-1.0, 50)]);
        let slices = generate_depth_slices(&points, 4).unwrap();
        assert!(slices.slices.is_empty());
        assert_eq!(slices.skipped.len(), 4);
    }
}
