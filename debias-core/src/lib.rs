//! # Core models and helpers for read-count bias correction.
//!
//! This crate holds the genomic interval models ([models::Region],
//! [models::RegionSet]) shared by every stage, the coordinate alignment used
//! when pairing signal positions with covariate rows, and the genome division
//! that splits analysis regions into fixed-size jobs.
//!
pub mod align;
pub mod consts;
pub mod divide;
pub mod errors;
pub mod models;
pub mod utils;

pub use align::align_coordinates;
pub use divide::{array_split, divide_genome};
