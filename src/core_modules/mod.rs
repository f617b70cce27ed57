pub mod backend;
pub mod colormap;
pub mod statistics;
