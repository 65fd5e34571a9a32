//! Core library modules for butterfly-map
//!
//! This module contains the controller, the engine trait it drives and the
//! merchant model it places on the map.

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod geo;
pub mod headless;
pub mod merchant;
pub mod schedule;

// Re-export main types for internal use
pub use config::MapConfig;
pub use controller::{MapViewController, PlacedMarker};
pub use engine::{MapEngine, MapEvent, MapHandle, MarkerHandle};
