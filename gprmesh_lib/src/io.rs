//! Writers for the files produced by a run and readers to load them again
//!
//! All writers go through [`io_utils::write_atomically`], so either the complete file exists at the
//! destination or the destination is left untouched.

pub mod io_utils;
pub mod json_format;
pub mod obj_format;
pub mod ply_format;

pub use json_format::{manifest_from_json, manifest_to_json};
pub use obj_format::{mesh_from_obj, mesh_to_obj};
pub use ply_format::{ColoredPointCloud, layer_to_ply, point_cloud_from_ply, point_cloud_to_ply};
