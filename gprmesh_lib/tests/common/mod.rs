#![allow(dead_code)]

use gprmesh_lib::DataTable;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fs;
use std::path::PathBuf;

/// Column layout of the generated tables: x, y, five unused columns, depth, amplitude
pub const HEADERS: [&str; 9] = [
    "X", "Y", "Trace", "Sample", "Time", "Lat", "Lon", "Depth", "Amplitude",
];

/// Returns an empty scratch directory unique to the test
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gprmesh_lib_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Builds a table row in the default column layout
pub fn row(x: f64, y: f64, depth: f64, amplitude: f64) -> Vec<String> {
    let mut cells = vec![x.to_string(), y.to_string()];
    cells.extend(["0", "0", "0", "", "n/a"].iter().map(|s| s.to_string()));
    cells.push(depth.to_string());
    cells.push(amplitude.to_string());
    cells
}

pub fn table_from_rows(rows: Vec<Vec<String>>) -> DataTable {
    DataTable::new(HEADERS.iter().map(|h| h.to_string()).collect(), rows).unwrap()
}

/// Uniformly distributed survey points over a 30 x 20 area, depths in [0, 5] and amplitudes in [-100, 100)
pub fn synthetic_table(n: usize, seed: u64) -> DataTable {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let rows = (0..n)
        .map(|_| {
            row(
                rng.gen_range(0.0..30.0),
                rng.gen_range(0.0..20.0),
                rng.gen_range(0.0..5.0),
                rng.gen_range(-100.0..100.0),
            )
        })
        .collect();
    table_from_rows(rows)
}

/// Writes the table as comma separated text
pub fn table_to_csv(table: &DataTable) -> String {
    let mut text = table.headers().join(",");
    text.push('\n');
    for row in table.rows() {
        text.push_str(&row.join(","));
        text.push('\n');
    }
    text
}

/// Returns the names of all files in the directory, sorted
pub fn file_names(dir: &PathBuf) -> Vec<String> {
    let mut names = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();
    names
}
