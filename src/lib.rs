//! # Butterfly-map Library
//!
//! Places nearby merchants on an interactive map and keeps the marker set in
//! step with the host application, without tying itself to a mapping SDK.
//!
//! ## Features
//!
//! - **Engine agnostic**: rendering lives behind the [`MapEngine`] trait
//! - **Single map**: re-initializing tears the previous map down first
//! - **Full replace**: every merchant update rebuilds the marker set in input order
//! - **Hover popups**: popups open on hover and close after a short debounce
//! - **Never fatal**: host-facing calls log failures instead of returning them
//! - **C bindings**: optional `c-bindings` feature for non-Rust hosts
//!
//! ## Basic Usage
//!
//! ```rust
//! use butterfly_map::{HeadlessEngine, MapEvent, MapViewController};
//!
//! # fn main() -> butterfly_map::Result<()> {
//! let mut controller = MapViewController::new(HeadlessEngine::with_containers(["map"]));
//! let handle = controller.initialize("map", 48.85, 2.35, 12.0)?;
//!
//! // The engine reports readiness asynchronously
//! controller.handle_event(MapEvent::Loaded(handle))?;
//!
//! controller.add_merchants(
//!     r#"[{"name":"A","latitude":48.86,"longitude":2.36,"availableBaskets":3,"price":5.5}]"#,
//! )?;
//! assert_eq!(controller.markers()[0].marker.display.price_text(), "5.50");
//!
//! controller.teardown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Async hosts
//!
//! ```rust,no_run
//! use butterfly_map::{HeadlessEngine, MapClient, MapViewController};
//!
//! #[tokio::main]
//! async fn main() {
//!     let controller = MapViewController::new(HeadlessEngine::with_containers(["map"]));
//!     let (client, _driver) = MapClient::spawn(controller);
//!
//!     // Failures are logged, never returned
//!     client.initialize_mapbox("map", 48.85, 2.35, 12.0).await;
//!     client.resize_map().await;
//!     client.cleanup_mapbox().await;
//! }
//! ```

pub use crate::core::config::{ControlPosition, GeolocateOptions, MapConfig, PopupOptions};
pub use crate::core::controller::{MapViewController, PlacedMarker};
pub use crate::core::engine::{Control, MapEngine, MapEvent, MapHandle, MapOptions, MarkerHandle, MarkerIcon};
pub use crate::core::error::{Error, Result};
pub use crate::core::geo::LatLng;
pub use crate::core::headless::HeadlessEngine;
pub use crate::core::merchant::{parse_merchants, DisplayData, Marker, MerchantInput, PopupContent};
pub use crate::runtime::MapClient;

// Internal modules
mod core;
mod runtime;

// C-compatible FFI bindings (optional)
#[cfg(feature = "c-bindings")]
pub mod ffi;
