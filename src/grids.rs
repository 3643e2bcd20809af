pub mod grid;
pub mod options;
