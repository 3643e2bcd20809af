//! Regular, optionally periodic N-dimensional lattices holding a scalar field and its
//! derivatives, with dense or sparse storage. Fields are built by kernel deposition,
//! queried by multilinear interpolation, analysed through contours, widest paths and
//! projections, reduced across workers and stored as text, cube or binary snapshots.

pub mod algorithms;
pub mod errors;
pub mod grids;
pub mod io;
pub mod serialization;
pub mod storage;
pub mod utilities;
