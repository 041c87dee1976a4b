pub mod common;
pub mod extrapolation;
pub mod linear;
pub mod models;
