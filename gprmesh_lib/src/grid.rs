//! Rasterization of scattered samples onto regular lattices
//!
//! Scattered values are interpolated linearly (barycentric weights on the Delaunay triangulation of
//! the sample positions). Lattice nodes outside of the convex hull of the samples receive a fill
//! value. If the samples do not span a triangle (fewer than three distinct or only collinear
//! positions), every grid is filled with the mean of its field instead. All grids are smoothed with
//! a separable Gaussian filter afterwards.

use crate::aabb::Aabb2d;
use log::warn;
use nalgebra::Vector2;
use rayon::prelude::*;
use spade::{DelaunayTriangulation, FloatTriangulation, HasPosition, Point2, Triangulation};
use thiserror::Error as ThisError;

/// Error type returned when grids of incompatible shapes are combined
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum GridShapeError {
    /// A grid or lattice with less than two nodes along an axis cannot be meshed
    #[error("at least 2 nodes per axis are required, got {rows}x{cols}")]
    TooSmall { rows: usize, cols: usize },
    /// The shape of a grid differs from the shape of the lattice or of another grid
    #[error("expected a {expected_rows}x{expected_cols} grid, got {rows}x{cols}")]
    ShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },
    /// The number of values does not match the requested shape
    #[error("{count} values do not fill a {rows}x{cols} grid")]
    ValueCount {
        rows: usize,
        cols: usize,
        count: usize,
    },
}

/// Returns `n` evenly spaced values from `start` to `end`, both inclusive
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut values = (0..n).map(|i| start + i as f64 * step).collect::<Vec<_>>();
            values[n - 1] = end;
            values
        }
    }
}

/// A regular lattice of sample locations, node `(i, j)` is located at `(xs[j], ys[i])`
#[derive(Clone, Debug, PartialEq)]
pub struct Lattice {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Lattice {
    /// Constructs a `resolution x resolution` lattice spanning the given bounding box
    pub fn new(bounds: &Aabb2d, resolution: usize) -> Self {
        Self {
            xs: linspace(bounds.min().x, bounds.max().x, resolution),
            ys: linspace(bounds.min().y, bounds.max().y, resolution),
        }
    }

    /// Constructs a lattice from explicit node coordinates along both axes
    pub fn from_axes(xs: Vec<f64>, ys: Vec<f64>) -> Self {
        Self { xs, ys }
    }

    /// Number of rows (nodes along y)
    pub fn rows(&self) -> usize {
        self.ys.len()
    }

    /// Number of columns (nodes along x)
    pub fn cols(&self) -> usize {
        self.xs.len()
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// Returns the position of the node in row `i` and column `j`
    #[inline(always)]
    pub fn node(&self, i: usize, j: usize) -> Vector2<f64> {
        Vector2::new(self.xs[j], self.ys[i])
    }

    /// Returns the bounding box spanned by the nodes, `None` for an empty lattice
    pub fn bounds(&self) -> Option<Aabb2d> {
        let (x_min, x_max) = (self.xs.first()?, self.xs.last()?);
        let (y_min, y_max) = (self.ys.first()?, self.ys.last()?);
        Some(Aabb2d::new(
            Vector2::new(*x_min, *y_min),
            Vector2::new(*x_max, *y_max),
        ))
    }
}

/// Scalar values on the nodes of a lattice, stored row-major
#[derive(Clone, Debug, PartialEq)]
pub struct Grid2d {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl Grid2d {
    /// Constructs a grid with every node set to the given value
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            values: vec![value; rows * cols],
        }
    }

    /// Constructs a grid from row-major values
    pub fn from_values(rows: usize, cols: usize, values: Vec<f64>) -> Result<Self, GridShapeError> {
        if values.len() != rows * cols {
            return Err(GridShapeError::ValueCount {
                rows,
                cols,
                count: values.len(),
            });
        }
        Ok(Self { rows, cols, values })
    }

    /// Constructs a grid by evaluating the function at every `(row, col)` index
    pub fn from_fn<F: FnMut(usize, usize) -> f64>(rows: usize, cols: usize, mut f: F) -> Self {
        let mut values = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                values.push(f(i, j));
            }
        }
        Self { rows, cols, values }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the row-major values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline(always)]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.cols + j]
    }

    /// Returns the smallest and largest value, `None` for an empty grid
    pub fn min_max(&self) -> Option<(f64, f64)> {
        let first = *self.values.first()?;
        Some(
            self.values
                .iter()
                .fold((first, first), |(min, max), &v| (min.min(v), max.max(v))),
        )
    }

    /// Checks that the grid has the same shape as the lattice
    pub fn check_shape(&self, lattice: &Lattice) -> Result<(), GridShapeError> {
        if self.rows != lattice.rows() || self.cols != lattice.cols() {
            return Err(GridShapeError::ShapeMismatch {
                expected_rows: lattice.rows(),
                expected_cols: lattice.cols(),
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    /// Returns a copy with values mapped linearly to `[0, 1]`, all zero if the grid is constant
    pub fn normalized(&self) -> Grid2d {
        let (min, max) = self.min_max().unwrap_or((0.0, 0.0));
        let range = max - min;
        let values = if range > 0.0 {
            self.values.iter().map(|v| (v - min) / range).collect()
        } else {
            vec![0.0; self.values.len()]
        };
        Grid2d {
            rows: self.rows,
            cols: self.cols,
            values,
        }
    }
}

/// Value assigned to lattice nodes outside of the convex hull of the samples
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FillValue {
    /// Arithmetic mean of the field's sample values
    Mean,
    Constant(f64),
}

/// Sample values of one scalar field, parallel to the sample positions
#[derive(Copy, Clone, Debug)]
pub struct ScalarField<'a> {
    pub values: &'a [f64],
    pub fill: FillValue,
}

impl<'a> ScalarField<'a> {
    pub fn new(values: &'a [f64], fill: FillValue) -> Self {
        Self { values, fill }
    }

    /// Mean of the sample values, zero if there are none
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.values.iter().sum::<f64>() / self.values.len() as f64
        }
    }

    fn fill_value(&self) -> f64 {
        match self.fill {
            FillValue::Mean => self.mean(),
            FillValue::Constant(value) => value,
        }
    }
}

/// Whether the linear interpolation succeeded or the grids were filled with mean values
#[derive(Clone, Debug, PartialEq)]
pub enum InterpolationOutcome {
    Interpolated,
    Fallback { reason: String },
}

impl InterpolationOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, InterpolationOutcome::Fallback { .. })
    }
}

/// Grids produced for a set of scalar fields on one lattice
#[derive(Clone, Debug)]
pub struct InterpolatedGrids {
    /// One grid per input field, in the order of the fields
    pub grids: Vec<Grid2d>,
    pub outcome: InterpolationOutcome,
}

#[derive(Copy, Clone, Debug)]
struct SampleVertex {
    position: Point2<f64>,
    index: usize,
}

impl HasPosition for SampleVertex {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

fn triangulate(positions: &[Vector2<f64>]) -> Result<DelaunayTriangulation<SampleVertex>, String> {
    let vertices = positions
        .iter()
        .enumerate()
        .map(|(index, p)| SampleVertex {
            position: Point2::new(p.x, p.y),
            index,
        })
        .collect::<Vec<_>>();

    let triangulation = DelaunayTriangulation::<SampleVertex>::bulk_load(vertices)
        .map_err(|err| format!("triangulation failed: {:?}", err))?;

    if triangulation.num_inner_faces() == 0 {
        return Err(format!(
            "the {} sample positions do not span a triangle (fewer than three distinct or collinear positions)",
            positions.len()
        ));
    }

    Ok(triangulation)
}

/// Linearly interpolates the scattered fields onto the nodes of the lattice
///
/// Degenerate sample positions are not an error: the grids are filled with the mean of their
/// field and the returned outcome describes the fallback.
pub fn interpolate_linear(
    positions: &[Vector2<f64>],
    fields: &[ScalarField],
    lattice: &Lattice,
) -> InterpolatedGrids {
    let (rows, cols) = (lattice.rows(), lattice.cols());

    let triangulation = match triangulate(positions) {
        Ok(triangulation) => triangulation,
        Err(reason) => {
            warn!(
                "Linear interpolation not possible, filling grids with mean values: {}",
                reason
            );
            return InterpolatedGrids {
                grids: fields
                    .iter()
                    .map(|field| Grid2d::filled(rows, cols, field.mean()))
                    .collect(),
                outcome: InterpolationOutcome::Fallback { reason },
            };
        }
    };

    let barycentric = triangulation.barycentric();
    let grids = fields
        .iter()
        .map(|field| {
            let fill = field.fill_value();
            Grid2d::from_fn(rows, cols, |i, j| {
                let node = lattice.node(i, j);
                barycentric
                    .interpolate(
                        |v| field.values[v.data().index],
                        Point2::new(node.x, node.y),
                    )
                    .unwrap_or(fill)
            })
        })
        .collect();

    InterpolatedGrids {
        grids,
        outcome: InterpolationOutcome::Interpolated,
    }
}

/// Returns the normalized weights of a sampled Gaussian with radius `round(4 * sigma)`
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma + 0.5) as isize;
    let weights = (-radius..=radius)
        .map(|x| (-0.5 * (x * x) as f64 / (sigma * sigma)).exp())
        .collect::<Vec<_>>();
    let sum = weights.iter().sum::<f64>();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Maps an index outside of `0..n` back into the range by mirroring at the borders (`d c b a | a b c d`)
#[inline(always)]
fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Applies a separable Gaussian filter with the given standard deviation (in nodes) to the grid
///
/// Values beyond the borders are obtained by reflection at the border. The filter is applied along
/// the rows first and along the columns second. Rows are processed in parallel, which does not
/// change the result.
pub fn gaussian_smooth(grid: &Grid2d, sigma: f64) -> Grid2d {
    if !(sigma > 0.0) || grid.values.is_empty() {
        return grid.clone();
    }

    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    let (rows, cols) = (grid.rows, grid.cols);

    // Along axis 0 (varying row index)
    let mut vertical = vec![0.0; rows * cols];
    vertical
        .par_chunks_mut(cols)
        .enumerate()
        .for_each(|(i, out_row)| {
            for (k, w) in kernel.iter().enumerate() {
                let src = reflect_index(i as isize + k as isize - radius, rows);
                let src_row = &grid.values[src * cols..(src + 1) * cols];
                for (out, v) in out_row.iter_mut().zip(src_row) {
                    *out += w * v;
                }
            }
        });

    // Along axis 1 (varying column index)
    let mut smoothed = vec![0.0; rows * cols];
    smoothed
        .par_chunks_mut(cols)
        .zip(vertical.par_chunks(cols))
        .for_each(|(out_row, in_row)| {
            for (j, out) in out_row.iter_mut().enumerate() {
                *out = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * in_row[reflect_index(j as isize + k as isize - radius, cols)])
                    .sum();
            }
        });

    Grid2d {
        rows,
        cols,
        values: smoothed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linspace_is_inclusive() {
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(2.0, 3.0, 1), vec![2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(*linspace(-0.3, 0.7, 7).last().unwrap(), 0.7);
    }

    #[test]
    fn test_lattice_node_layout() {
        let bounds = Aabb2d::new(Vector2::new(0.0, 10.0), Vector2::new(4.0, 12.0));
        let lattice = Lattice::new(&bounds, 3);
        assert_eq!(lattice.node(0, 2), Vector2::new(4.0, 10.0));
        assert_eq!(lattice.node(2, 0), Vector2::new(0.0, 12.0));
        assert_eq!(lattice.bounds(), Some(bounds));
    }

    #[test]
    fn test_grid_shape_checks() {
        assert!(matches!(
            Grid2d::from_values(2, 2, vec![1.0; 3]),
            Err(GridShapeError::ValueCount { count: 3, .. })
        ));
        let lattice = Lattice::from_axes(vec![0.0, 1.0, 2.0], vec![0.0, 1.0]);
        assert!(Grid2d::filled(2, 3, 0.0).check_shape(&lattice).is_ok());
        assert!(Grid2d::filled(3, 2, 0.0).check_shape(&lattice).is_err());
    }

    #[test]
    fn test_normalized_grid() {
        let grid = Grid2d::from_values(1, 3, vec![2.0, 4.0, 3.0]).unwrap();
        assert_eq!(grid.normalized().values(), &[0.0, 1.0, 0.5]);
        assert_eq!(Grid2d::filled(2, 2, 7.0).normalized().values(), &[0.0; 4]);
    }

    #[test]
    fn test_interpolation_reproduces_plane() {
        let plane = |p: &Vector2<f64>| 2.0 * p.x + 3.0 * p.y - 1.0;
        let mut positions = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
            Vector2::new(1.0, 1.0),
        ];
        for k in 1..20 {
            let t = k as f64 / 20.0;
            positions.push(Vector2::new(t, (t * 7.3).fract()));
        }
        let values = positions.iter().map(plane).collect::<Vec<_>>();

        let bounds = Aabb2d::from_points(positions.iter().copied()).unwrap();
        let lattice = Lattice::new(&bounds, 11);
        let result = interpolate_linear(
            &positions,
            &[ScalarField::new(&values, FillValue::Mean)],
            &lattice,
        );

        assert_eq!(result.outcome, InterpolationOutcome::Interpolated);
        let grid = &result.grids[0];
        for i in 0..lattice.rows() {
            for j in 0..lattice.cols() {
                let expected = plane(&lattice.node(i, j));
                assert!((grid.get(i, j) - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_nodes_outside_hull_are_filled() {
        let positions = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
        ];
        let z = vec![-1.0, -2.0, -3.0];
        let amplitude = vec![4.0, 5.0, 6.0];
        let lattice = Lattice::new(&Aabb2d::from_points(positions.iter().copied()).unwrap(), 3);

        let result = interpolate_linear(
            &positions,
            &[
                ScalarField::new(&z, FillValue::Mean),
                ScalarField::new(&amplitude, FillValue::Constant(0.0)),
            ],
            &lattice,
        );

        assert!(!result.outcome.is_fallback());
        assert_eq!(result.grids[0].get(2, 2), -2.0);
        assert_eq!(result.grids[1].get(2, 2), 0.0);
        assert!((result.grids[1].get(0, 0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_collinear_samples_fall_back_to_mean() {
        let positions = (0..5)
            .map(|i| Vector2::new(i as f64, 2.0 * i as f64))
            .collect::<Vec<_>>();
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let lattice = Lattice::from_axes(vec![0.0, 2.0, 4.0], vec![0.0, 4.0, 8.0]);

        let result = interpolate_linear(
            &positions,
            &[ScalarField::new(&values, FillValue::Constant(0.0))],
            &lattice,
        );

        assert!(result.outcome.is_fallback());
        assert!(result.grids[0].values().iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_gaussian_kernel() {
        let kernel = gaussian_kernel(1.0);
        assert_eq!(kernel.len(), 9);
        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(kernel[0], kernel[8]);
        assert!((kernel[4] - 0.398_943_5).abs() < 1e-6);
    }

    #[test]
    fn test_reflect_index() {
        let mapped = (-3..8).map(|i| reflect_index(i, 4)).collect::<Vec<_>>();
        assert_eq!(mapped, vec![2, 1, 0, 0, 1, 2, 3, 3, 2, 1, 0]);
        assert_eq!(reflect_index(-2, 1), 0);
    }

    #[test]
    fn test_smoothing_constant_grid_is_identity() {
        let grid = Grid2d::filled(6, 4, 2.5);
        let smoothed = gaussian_smooth(&grid, 1.0);
        assert!(smoothed.values().iter().all(|v| (v - 2.5).abs() < 1e-12));
    }

    #[test]
    fn test_smoothing_impulse_response() {
        let grid = Grid2d::from_fn(15, 15, |i, j| if i == 7 && j == 7 { 1.0 } else { 0.0 });
        let smoothed = gaussian_smooth(&grid, 1.0);

        let kernel = gaussian_kernel(1.0);
        assert!((smoothed.get(7, 7) - kernel[4] * kernel[4]).abs() < 1e-12);
        assert!((smoothed.get(7, 9) - kernel[4] * kernel[6]).abs() < 1e-12);
        assert!((smoothed.values().iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(smoothed.get(0, 0), 0.0);
    }

    #[test]
    fn test_smoothing_reflects_at_border() {
        // A single row is mirrored onto itself along axis 0
        let grid = Grid2d::from_values(1, 3, vec![0.0, 0.0, 3.0]).unwrap();
        let smoothed = gaussian_smooth(&grid, 1.0);
        assert!((smoothed.values().iter().sum::<f64>() - 3.0).abs() < 1e-12);
        assert!(smoothed.get(0, 2) > smoothed.get(0, 0));
    }
}
