//! Helper functions for the ASCII PLY point cloud format
//!
//! Point clouds are written as
//! ```text
//! ply
//! format ascii 1.0
//! element vertex 2
//! property float x
//! property float y
//! property float z
//! property uchar red
//! property uchar green
//! property uchar blue
//! end_header
//! 0.500000 -1.250000 -0.031000 255 165 0
//! ...
//! ```

use crate::filter::IsoLayer;
use crate::io::io_utils::write_atomically;
use anyhow::{Context, anyhow, bail};
use nalgebra::Vector3;
use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;

/// Point positions with one RGB color per point
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColoredPointCloud {
    pub positions: Vec<Vector3<f64>>,
    pub colors: Vec<[u8; 3]>,
}

fn write_ply_points<W: Write, I: Iterator<Item = (Vector3<f64>, [u8; 3])>>(
    writer: &mut W,
    count: usize,
    points: I,
) -> io::Result<()> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", count)?;
    for axis in ["x", "y", "z"] {
        writeln!(writer, "property float {}", axis)?;
    }
    for channel in ["red", "green", "blue"] {
        writeln!(writer, "property uchar {}", channel)?;
    }
    writeln!(writer, "end_header")?;

    for (p, [r, g, b]) in points {
        writeln!(
            writer,
            "{:.6} {:.6} {:.6} {} {} {}",
            p.x, p.y, p.z, r, g, b
        )?;
    }
    Ok(())
}

/// Writes the points of an iso-layer in the layer's color
pub fn layer_to_ply<P: AsRef<Path>>(layer: &IsoLayer, filename: P) -> io::Result<()> {
    write_atomically(filename, |writer| {
        write_ply_points(
            writer,
            layer.points.len(),
            layer.points.iter().map(|p| (p.position, layer.color)),
        )
    })
}

/// Writes a colored point cloud, positions and colors have to be of the same length
pub fn point_cloud_to_ply<P: AsRef<Path>>(
    cloud: &ColoredPointCloud,
    filename: P,
) -> io::Result<()> {
    if cloud.positions.len() != cloud.colors.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "{} positions but {} colors",
                cloud.positions.len(),
                cloud.colors.len()
            ),
        ));
    }
    write_atomically(filename, |writer| {
        write_ply_points(
            writer,
            cloud.positions.len(),
            cloud
                .positions
                .iter()
                .copied()
                .zip(cloud.colors.iter().copied()),
        )
    })
}

/// Tries to load the file at the given path as an ASCII PLY point cloud
pub fn point_cloud_from_ply<P: AsRef<Path>>(
    ply_path: P,
) -> Result<ColoredPointCloud, anyhow::Error> {
    let text = fs::read_to_string(ply_path).context("Failed to open file for reading")?;
    parse_point_cloud_ply(&text).context("Failed to parse PLY file")
}

/// Parses an ASCII PLY file with a vertex element providing `x y z` and optionally `red green blue`
///
/// Coordinates are parsed as `f64`, so values keep the precision they were written with.
pub fn parse_point_cloud_ply(text: &str) -> Result<ColoredPointCloud, anyhow::Error> {
    let mut lines = text.lines();
    if lines.next().map(str::trim) != Some("ply") {
        bail!("missing 'ply' magic line");
    }

    let mut vertex_count = None;
    let mut properties = Vec::new();
    let mut in_vertex_element = false;
    loop {
        let line = lines
            .next()
            .ok_or_else(|| anyhow!("header is not terminated by 'end_header'"))?
            .trim();
        let tokens = line.split_whitespace().collect::<Vec<_>>();
        match tokens.as_slice() {
            ["end_header"] => break,
            ["format", "ascii", _] => {}
            ["format", other, ..] => bail!("unsupported PLY format '{}'", other),
            ["comment", ..] | [] => {}
            ["element", "vertex", count] => {
                vertex_count = Some(
                    count
                        .parse::<usize>()
                        .with_context(|| format!("invalid vertex count '{}'", count))?,
                );
                in_vertex_element = true;
            }
            ["element", ..] => in_vertex_element = false,
            ["property", _, name] if in_vertex_element => properties.push(name.to_string()),
            ["property", ..] => {}
            _ => bail!("unexpected header line '{}'", line),
        }
    }

    let vertex_count = vertex_count.ok_or_else(|| anyhow!("PLY file is missing a 'vertex' element"))?;
    let index_of = |name: &str| properties.iter().position(|p| p == name);
    let (x, y, z) = match (index_of("x"), index_of("y"), index_of("z")) {
        (Some(x), Some(y), Some(z)) => (x, y, z),
        _ => bail!("vertex element is missing one of the properties x, y, z"),
    };
    let color_indices = match (index_of("red"), index_of("green"), index_of("blue")) {
        (Some(r), Some(g), Some(b)) => Some([r, g, b]),
        _ => None,
    };

    let mut cloud = ColoredPointCloud {
        positions: Vec::with_capacity(vertex_count),
        colors: Vec::with_capacity(if color_indices.is_some() { vertex_count } else { 0 }),
    };

    for row in 0..vertex_count {
        let line = lines
            .next()
            .ok_or_else(|| anyhow!("expected {} vertices, found {}", vertex_count, row))?;
        let values = line.split_whitespace().collect::<Vec<_>>();
        if values.len() != properties.len() {
            bail!(
                "vertex {} has {} values, expected {}",
                row,
                values.len(),
                properties.len()
            );
        }

        let coordinate = |i: usize| {
            values[i]
                .parse::<f64>()
                .with_context(|| format!("invalid coordinate '{}' of vertex {}", values[i], row))
        };
        cloud
            .positions
            .push(Vector3::new(coordinate(x)?, coordinate(y)?, coordinate(z)?));

        if let Some(indices) = color_indices {
            let mut color = [0u8; 3];
            for (c, &i) in color.iter_mut().zip(indices.iter()) {
                *c = values[i]
                    .parse::<u8>()
                    .with_context(|| format!("invalid color '{}' of vertex {}", values[i], row))?;
            }
            cloud.colors.push(color);
        }
    }

    Ok(cloud)
}
