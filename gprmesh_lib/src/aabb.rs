//! Axis-aligned bounding boxes of survey points and lattices

use std::fmt;
use std::fmt::Debug;

use nalgebra::SVector;
use rayon::prelude::*;

/// Type representing an axis aligned bounding box in arbitrary dimensions
#[derive(Clone, PartialEq)]
pub struct AxisAlignedBoundingBox<const D: usize> {
    min: SVector<f64, D>,
    max: SVector<f64, D>,
}

/// Convenience type alias for an AABB in two dimensions (the horizontal survey plane)
pub type Aabb2d = AxisAlignedBoundingBox<2>;
/// Convenience type alias for an AABB in three dimensions
pub type Aabb3d = AxisAlignedBoundingBox<3>;

impl<const D: usize> AxisAlignedBoundingBox<D> {
    /// Constructs a degenerate AABB with min and max set to zero
    #[inline(always)]
    pub fn zeros() -> Self {
        Self::from_point(SVector::zeros())
    }

    /// Constructs an AABB with the given min and max bounding points
    #[inline(always)]
    pub fn new(min: SVector<f64, D>, max: SVector<f64, D>) -> Self {
        Self { min, max }
    }

    /// Constructs a degenerate AABB with zero extents centered at the given point
    #[inline(always)]
    pub fn from_point(point: SVector<f64, D>) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Constructs the smallest AABB fitting around all points yielded by the iterator, `None` if it is empty
    /// ```
    /// use gprmesh_lib::Aabb2d;
    /// use gprmesh_lib::nalgebra::Vector2;
    ///
    /// assert!(Aabb2d::from_points(std::iter::empty()).is_none());
    ///
    /// let aabb = Aabb2d::from_points([
    ///     Vector2::new(1.0, 1.0),
    ///     Vector2::new(0.5, 3.0),
    ///     Vector2::new(-1.0, 1.0)
    /// ]).unwrap();
    /// assert_eq!(aabb.min(), &Vector2::new(-1.0, 1.0));
    /// assert_eq!(aabb.max(), &Vector2::new(1.0, 3.0));
    /// ```
    pub fn from_points<I: IntoIterator<Item = SVector<f64, D>>>(points: I) -> Option<Self> {
        let mut point_iter = points.into_iter();
        let mut aabb = Self::from_point(point_iter.next()?);
        for next_point in point_iter {
            aabb.join_with_point(&next_point);
        }
        Some(aabb)
    }

    /// Constructs the smallest AABB fitting around all the given points, parallel version
    pub fn par_from_points(points: &[SVector<f64, D>]) -> Option<Self> {
        let initial_aabb = Self::from_point(*points.first()?);
        Some(
            points[1..]
                .par_iter()
                .fold(
                    || initial_aabb.clone(),
                    |mut aabb, next_point| {
                        aabb.join_with_point(next_point);
                        aabb
                    },
                )
                .reduce(
                    || initial_aabb.clone(),
                    |mut final_aabb, aabb| {
                        final_aabb.join(&aabb);
                        final_aabb
                    },
                ),
        )
    }

    /// Returns the min coordinate of the bounding box
    #[inline(always)]
    pub fn min(&self) -> &SVector<f64, D> {
        &self.min
    }

    /// Returns the max coordinate of the bounding box
    #[inline(always)]
    pub fn max(&self) -> &SVector<f64, D> {
        &self.max
    }

    /// Returns the extents of the bounding box (vector connecting min and max point of the box)
    #[inline(always)]
    pub fn extents(&self) -> SVector<f64, D> {
        self.max - self.min
    }

    /// Returns the largest scalar extent of the AABB over all of its dimensions
    /// ```
    /// use gprmesh_lib::Aabb3d;
    /// use nalgebra::Vector3;
    /// assert_eq!(Aabb3d::zeros().max_extent(), 0.0);
    /// assert_eq!(Aabb3d::new(Vector3::new(-10.0, 0.0, -3.0), Vector3::new(2.0, 2.0, 4.0)).max_extent(), 12.0);
    /// ```
    #[inline(always)]
    pub fn max_extent(&self) -> f64 {
        let extents = self.extents();
        // Use imax indirectly, because max is broken in nalgebra
        extents[extents.imax()]
    }

    /// Enlarges this AABB to the smallest AABB enclosing both itself and another AABB
    pub fn join(&mut self, other: &Self) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// Enlarges this AABB to the smallest AABB enclosing both itself and another point
    pub fn join_with_point(&mut self, point: &SVector<f64, D>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Returns the min and max corner as plain arrays
    pub fn to_arrays(&self) -> ([f64; D], [f64; D]) {
        (self.min.into(), self.max.into())
    }
}

impl<const D: usize> Debug for AxisAlignedBoundingBox<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AxisAlignedBoundingBox {{ min: {:.7?}, max: {:.7?} }}",
            self.min.as_slice(),
            self.max.as_slice()
        )
    }
}

#[test]
fn test_aabb_par_from_points_matches_sequential() {
    use nalgebra::Vector3;
    let points = (0..1000)
        .map(|i| {
            let t = i as f64;
            Vector3::new((t * 0.37).sin() * 4.0, (t * 0.11).cos() * 2.0, -t * 0.01)
        })
        .collect::<Vec<_>>();

    let seq = Aabb3d::from_points(points.iter().copied()).unwrap();
    let par = Aabb3d::par_from_points(&points).unwrap();
    assert_eq!(seq, par);
    assert!(Aabb3d::par_from_points(&[]).is_none());
}
