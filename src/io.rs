pub mod cube_file;
pub mod grid_file;
