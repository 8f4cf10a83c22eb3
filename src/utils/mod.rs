// src/utils/mod.rs

pub mod linear_algebra;

pub use linear_algebra::{build_diagonal_operator, build_diffusion_operator};
