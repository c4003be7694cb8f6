use gprmesh_lib::{PointSet, SurveyPoint};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Uniformly distributed points in a 30 x 20 x 5 box with amplitudes in [-100, 100)
pub fn uniform_points(n: usize, seed: u64) -> PointSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            SurveyPoint::new(
                rng.gen_range(0.0..30.0),
                rng.gen_range(0.0..20.0),
                -rng.gen_range(0.0..5.0),
                rng.gen_range(-100.0..100.0),
            )
        })
        .collect()
}
