#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Pinhole camera model.
pub mod camera;

/// Cooperative deadlines for long running operations.
pub mod deadline;

/// I/O utilities for writing meshes and point clouds.
pub mod io;

/// Linear algebra utilities.
pub mod linalg;

/// Triangle meshes.
pub mod mesh;

/// Point cloud container and normal estimation.
pub mod pointcloud;

/// Relative pose estimation algorithms.
pub mod pose;

/// Surface reconstruction from oriented points.
pub mod surface;

/// Triangulation of correspondences.
pub mod triangulation;
