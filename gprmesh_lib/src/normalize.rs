use crate::aabb::{Aabb2d, Aabb3d};
use crate::dataset::DataTable;
use crate::settings::{ProcessingSettings, RESCALE_RANGE_THRESHOLD, RESCALE_TARGET_RANGE};
use crate::PipelineError;
use log::{info, warn};
use nalgebra::{Vector2, Vector3};

/// A single survey sample with position and signal amplitude, all values are finite
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SurveyPoint {
    pub position: Vector3<f64>,
    pub amplitude: f64,
}

impl SurveyPoint {
    pub fn new(x: f64, y: f64, z: f64, amplitude: f64) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            amplitude,
        }
    }

    #[inline(always)]
    pub fn abs_amplitude(&self) -> f64 {
        self.amplitude.abs()
    }

    #[inline(always)]
    pub fn horizontal(&self) -> Vector2<f64> {
        self.position.xy()
    }
}

/// Ordered collection of survey points sharing one normalization pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointSet {
    points: Vec<SurveyPoint>,
}

impl PointSet {
    pub fn new(points: Vec<SurveyPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[SurveyPoint] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SurveyPoint> {
        self.points.iter()
    }

    pub fn into_points(self) -> Vec<SurveyPoint> {
        self.points
    }

    /// Returns the absolute amplitudes in point order
    pub fn abs_amplitudes(&self) -> Vec<f64> {
        self.points.iter().map(SurveyPoint::abs_amplitude).collect()
    }

    /// Returns the 3D bounding box of all points, `None` if the set is empty
    pub fn bounds(&self) -> Option<Aabb3d> {
        Aabb3d::from_points(self.points.iter().map(|p| p.position))
    }

    /// Returns the bounding box of the horizontal (x, y) coordinates, `None` if the set is empty
    pub fn horizontal_bounds(&self) -> Option<Aabb2d> {
        Aabb2d::from_points(self.points.iter().map(SurveyPoint::horizontal))
    }

    /// Returns the min and max absolute amplitude, `None` if the set is empty
    pub fn abs_amplitude_range(&self) -> Option<[f64; 2]> {
        let mut iter = self.points.iter().map(SurveyPoint::abs_amplitude);
        let first = iter.next()?;
        Some(iter.fold([first, first], |[min, max], a| [min.min(a), max.max(a)]))
    }

    /// Returns a new set with the points for which the predicate holds, keeping their order
    pub fn select<F: Fn(&SurveyPoint) -> bool>(&self, predicate: F) -> PointSet {
        PointSet::new(self.points.iter().filter(|p| predicate(p)).copied().collect())
    }
}

impl FromIterator<SurveyPoint> for PointSet {
    fn from_iter<I: IntoIterator<Item = SurveyPoint>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Bookkeeping of the normalization of a table
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizationReport {
    /// Number of data rows in the table
    pub total_rows: usize,
    /// Rows discarded because one of the selected cells is not a finite number
    pub dropped_rows: usize,
    /// Horizontal mean subtracted from all points, if centering was applied
    pub center_offset: Option<Vector2<f64>>,
    /// Factor all coordinates were multiplied with, if rescaling was applied
    pub scale_factor: Option<f64>,
}

/// Parses a single cell as a finite floating point number
pub fn parse_numeric(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Converts the selected columns of the table into survey points, dropping rows with invalid cells
///
/// Returns the points and the number of dropped rows.
pub fn extract_points(
    table: &DataTable,
    settings: &ProcessingSettings,
) -> Result<(Vec<SurveyPoint>, usize), PipelineError> {
    let column_count = table.column_count();
    for (role, index) in settings.columns.named() {
        if index >= column_count {
            return Err(PipelineError::Schema {
                role,
                index,
                column_count,
            });
        }
    }

    let columns = &settings.columns;
    let points = table
        .rows()
        .iter()
        .filter_map(|row| {
            Some(SurveyPoint::new(
                parse_numeric(&row[columns.x])?,
                parse_numeric(&row[columns.y])?,
                parse_numeric(&row[columns.z])?,
                parse_numeric(&row[columns.amplitude])?,
            ))
        })
        .collect::<Vec<_>>();

    let dropped = table.row_count() - points.len();
    Ok((points, dropped))
}

/// Extracts the survey points of the table and applies the coordinate transforms
///
/// The transforms are applied in a fixed order:
///  1. depth inversion `z = -|z|` (if enabled)
///  2. subtraction of the horizontal mean (if enabled)
///  3. uniform scaling of all coordinates by `10 / range` if the larger horizontal extent `range` exceeds 50
pub fn normalize_points(
    table: &DataTable,
    settings: &ProcessingSettings,
) -> Result<(PointSet, NormalizationReport), PipelineError> {
    let (mut points, dropped_rows) = extract_points(table, settings)?;
    if points.is_empty() {
        return Err(PipelineError::EmptyDataset {
            total_rows: table.row_count(),
        });
    }
    if dropped_rows > 0 {
        warn!(
            "Dropped {} of {} rows with non-numeric values in the selected columns",
            dropped_rows,
            table.row_count()
        );
    }

    let mut report = NormalizationReport {
        total_rows: table.row_count(),
        dropped_rows,
        ..Default::default()
    };

    if settings.invert_depth {
        for p in points.iter_mut() {
            p.position.z = -p.position.z.abs();
        }
    }

    if settings.center_coordinates {
        let sum = points
            .iter()
            .fold(Vector2::zeros(), |acc: Vector2<f64>, p| acc + p.horizontal());
        let mean = sum / points.len() as f64;
        for p in points.iter_mut() {
            p.position.x -= mean.x;
            p.position.y -= mean.y;
        }
        report.center_offset = Some(mean);
    }

    let point_set = PointSet::new(points);
    if let Some(bounds) = point_set.horizontal_bounds() {
        let range = bounds.max_extent();
        if range > RESCALE_RANGE_THRESHOLD {
            let scale = RESCALE_TARGET_RANGE / range;
            info!(
                "Horizontal extent {:.3} exceeds {}, scaling all coordinates by {:.6}",
                range, RESCALE_RANGE_THRESHOLD, scale
            );
            report.scale_factor = Some(scale);
            let points = point_set
                .into_points()
                .into_iter()
                .map(|p| SurveyPoint {
                    position: p.position * scale,
                    ..p
                })
                .collect::<PointSet>();
            return Ok((points, report));
        }
    }

    Ok((point_set, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[[&str; 4]]) -> DataTable {
        DataTable::new(
            vec!["x".into(), "y".into(), "z".into(), "amp".into()],
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
        .unwrap()
    }

    fn plain_settings() -> ProcessingSettings {
        let mut settings = ProcessingSettings::default();
        settings.columns.z = 2;
        settings.columns.amplitude = 3;
        settings
    }

    #[test]
    fn test_schema_error_names_column() {
        let settings = ProcessingSettings::default();
        let err = normalize_points(&table(&[["1", "2", "3", "4"]]), &settings).unwrap_err();
        match err {
            PipelineError::Schema {
                role,
                index,
                column_count,
            } => {
                assert_eq!(role, "z");
                assert_eq!(index, 7);
                assert_eq!(column_count, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_rows_are_dropped() {
        let (points, report) = normalize_points(
            &table(&[
                ["0", "0", "1", "5"],
                ["1", "abc", "1", "5"],
                ["2", "2", "", "5"],
                ["4", "4", "3", "inf"],
                ["4", "4", "3", "-2"],
            ]),
            &plain_settings(),
        )
        .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(report.total_rows, 5);
        assert_eq!(report.dropped_rows, 3);
    }

    #[test]
    fn test_all_rows_invalid() {
        let err = normalize_points(&table(&[["a", "b", "c", "d"]]), &plain_settings()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDataset { total_rows: 1 }));
    }

    #[test]
    fn test_invert_and_center() {
        let (points, report) = normalize_points(
            &table(&[["0", "10", "2", "1"], ["4", "20", "-3", "1"]]),
            &plain_settings(),
        )
        .unwrap();

        assert_eq!(report.center_offset, Some(Vector2::new(2.0, 15.0)));
        assert_eq!(report.scale_factor, None);
        assert_eq!(points.points()[0].position, Vector3::new(-2.0, -5.0, -2.0));
        assert_eq!(points.points()[1].position, Vector3::new(2.0, 5.0, -3.0));
    }

    #[test]
    fn test_transforms_disabled() {
        let mut settings = plain_settings();
        settings.invert_depth = false;
        settings.center_coordinates = false;
        let (points, report) =
            normalize_points(&table(&[["1", "2", "3", "4"]]), &settings).unwrap();
        assert_eq!(points.points()[0], SurveyPoint::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(report.center_offset, None);
    }

    #[test]
    fn test_large_extent_is_rescaled() {
        let mut settings = plain_settings();
        settings.center_coordinates = false;
        settings.invert_depth = false;
        let (points, report) = normalize_points(
            &table(&[["0", "0", "4", "1"], ["100", "20", "8", "1"]]),
            &settings,
        )
        .unwrap();

        assert_eq!(report.scale_factor, Some(0.1));
        let bounds = points.bounds().unwrap();
        assert!((bounds.max_extent() - 10.0).abs() < 1e-12);
        assert!((points.points()[1].position.z - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_extent_at_threshold_is_kept() {
        let mut settings = plain_settings();
        settings.center_coordinates = false;
        let (_, report) = normalize_points(
            &table(&[["0", "0", "4", "1"], ["50", "0", "8", "1"]]),
            &settings,
        )
        .unwrap();
        assert_eq!(report.scale_factor, None);
    }
}
