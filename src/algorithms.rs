pub mod contour;
pub mod integration;
pub mod interpolation;
pub mod kernel;
pub mod path_search;
pub mod projection;
pub mod reduction;
