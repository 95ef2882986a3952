//! # Biogeo Common Library
//!
//! Shared code for the biogeo enrichment tools including:
//! - Common error types
//! - TOML configuration loading
//! - Geodesy utilities (coordinates, haversine distance, bounding boxes)

pub mod config;
pub mod error;
pub mod geodesy;

pub use error::{Error, Result};
pub use geodesy::Coordinate;
