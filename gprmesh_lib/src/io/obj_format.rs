//! Helper functions for the OBJ file format

use crate::io::io_utils::write_atomically;
use crate::mesh::TriMesh3d;
use anyhow::{Context, anyhow, bail};
use nalgebra::Vector3;
use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;

fn write_obj<W: Write>(writer: &mut W, mesh: &TriMesh3d) -> io::Result<()> {
    writeln!(
        writer,
        "# OBJ file with {} vertices and {} faces",
        mesh.vertices.len(),
        mesh.triangles.len()
    )?;

    if mesh.has_colors() {
        for (v, c) in mesh.vertices.iter().zip(mesh.vertex_colors.iter()) {
            writeln!(
                writer,
                "v {:.6} {:.6} {:.6} {:.4} {:.4} {:.4}",
                v.x, v.y, v.z, c.x, c.y, c.z
            )?;
        }
    } else {
        for v in &mesh.vertices {
            writeln!(writer, "v {:.6} {:.6} {:.6}", v.x, v.y, v.z)?;
        }
    }

    for f in &mesh.triangles {
        writeln!(writer, "f {} {} {}", f[0] + 1, f[1] + 1, f[2] + 1)?;
    }

    Ok(())
}

/// Writes the mesh with vertex colors (if present) and 1-based triangle indices
pub fn mesh_to_obj<P: AsRef<Path>>(mesh: &TriMesh3d, filename: P) -> io::Result<()> {
    if !mesh.is_consistent() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "mesh has out of range triangle indices or mismatched vertex colors",
        ));
    }
    write_atomically(filename, |writer| write_obj(writer, mesh))
}

/// Tries to load the file at the given path as a triangle mesh
///
/// Supports `v x y z [r g b]` vertex lines and `f` lines with three vertices (only the position
/// index of `v/vt/vn` references is used). Other statements are ignored.
pub fn mesh_from_obj<P: AsRef<Path>>(obj_path: P) -> Result<TriMesh3d, anyhow::Error> {
    let text = fs::read_to_string(obj_path).context("Failed to open file for reading")?;
    parse_obj(&text).context("Failed to parse OBJ file")
}

fn parse_obj(text: &str) -> Result<TriMesh3d, anyhow::Error> {
    let mut mesh = TriMesh3d::default();

    for (line_number, line) in text.lines().enumerate() {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let values = tokens
                    .map(|t| {
                        t.parse::<f64>()
                            .with_context(|| format!("line {}: invalid number '{}'", line_number + 1, t))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                match values.as_slice() {
                    [x, y, z] => mesh.vertices.push(Vector3::new(*x, *y, *z)),
                    [x, y, z, r, g, b] => {
                        mesh.vertices.push(Vector3::new(*x, *y, *z));
                        mesh.vertex_colors.push(Vector3::new(*r, *g, *b));
                    }
                    _ => bail!(
                        "line {}: expected 3 or 6 vertex values, found {}",
                        line_number + 1,
                        values.len()
                    ),
                }
            }
            Some("f") => {
                let indices = tokens
                    .map(|t| {
                        let position = t.split('/').next().unwrap_or(t);
                        position
                            .parse::<usize>()
                            .ok()
                            .filter(|&i| i > 0)
                            .map(|i| i - 1)
                            .ok_or_else(|| {
                                anyhow!("line {}: invalid face index '{}'", line_number + 1, t)
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                match indices.as_slice() {
                    [a, b, c] => mesh.triangles.push([*a, *b, *c]),
                    _ => bail!(
                        "line {}: only triangles are supported, found {} vertices",
                        line_number + 1,
                        indices.len()
                    ),
                }
            }
            _ => {}
        }
    }

    if !mesh.is_consistent() {
        bail!("face indices out of range or colors missing for some vertices");
    }

    Ok(mesh)
}
