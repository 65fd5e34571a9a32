//! The mapping engine seen from butterfly-map
//!
//! Rendering, tiles, gestures and geolocation all live behind [`MapEngine`].
//! The controller only ever holds the opaque handles the engine gives back.

use std::fmt;

use serde::Serialize;

use crate::core::config::{ControlPosition, GeolocateOptions, PopupOptions};
use crate::core::error::Result;
use crate::core::geo::LatLng;
use crate::core::merchant::PopupContent;

/// Opaque reference to a live map view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapHandle(pub u64);

/// Opaque reference to a live marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(pub u64);

impl fmt::Display for MapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map#{}", self.0)
    }
}

impl fmt::Display for MarkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

/// Everything the engine needs to construct a map view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapOptions {
    pub container_id: String,
    pub style_url: String,
    pub access_token: Option<String>,
    pub center: LatLng,
    pub zoom: f64,
    pub preserve_drawing_buffer: bool,
    pub fail_if_major_performance_caveat: bool,
}

/// Controls installed once the map is ready
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Control {
    Navigation,
    Geolocate(GeolocateOptions),
}

/// Marker appearance: an image with a fallback and an accessible label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerIcon {
    pub src: String,
    pub fallback_src: String,
    pub alt: String,
}

/// Notifications delivered to the controller by the engine or the host
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// The map finished loading its style
    Loaded(MapHandle),
    /// The engine reported a runtime error for a map
    EngineError { map: MapHandle, message: String },
    /// The host window changed size
    WindowResized,
    /// Pointer entered a marker
    MarkerPointerEnter(MarkerHandle),
    /// Pointer left a marker
    MarkerPointerLeave(MarkerHandle),
}

/// External mapping engine consumed by the controller
///
/// Implementations wrap a real SDK (through FFI or bindings) or, like
/// [`HeadlessEngine`](crate::core::headless::HeadlessEngine), keep everything
/// in memory.
pub trait MapEngine {
    /// Make the container fill its parent; `false` if it does not exist
    fn prepare_container(&mut self, container_id: &str) -> bool;

    /// Known container ids, used for suggestions when a lookup fails
    fn container_ids(&self) -> Vec<String> {
        Vec::new()
    }

    fn create_map(&mut self, options: &MapOptions) -> Result<MapHandle>;

    fn add_control(
        &mut self,
        map: MapHandle,
        control: &Control,
        position: ControlPosition,
    ) -> Result<()>;

    /// Re-measure the container and resize the rendering buffers
    fn resize(&mut self, map: MapHandle) -> Result<()>;

    /// Current container size in pixels, when the engine can tell
    fn container_size(&self, _map: MapHandle) -> Option<(u32, u32)> {
        None
    }

    /// Release the map; the handle must not be used afterwards
    fn remove_map(&mut self, map: MapHandle);

    /// Ask the host to deliver [`MapEvent::WindowResized`] from now on
    fn register_window_resize_listener(&mut self);

    fn add_marker(
        &mut self,
        map: MapHandle,
        position: LatLng,
        icon: &MarkerIcon,
    ) -> Result<MarkerHandle>;

    fn set_popup(
        &mut self,
        marker: MarkerHandle,
        content: &PopupContent,
        options: &PopupOptions,
    ) -> Result<()>;

    fn show_popup(&mut self, map: MapHandle, marker: MarkerHandle);

    fn hide_popup(&mut self, marker: MarkerHandle);

    /// Whether the pointer currently sits on the marker's popup
    fn is_popup_hovered(&self, marker: MarkerHandle) -> bool;

    /// Detach the marker and its popup
    fn remove_marker(&mut self, marker: MarkerHandle);
}

impl<E: MapEngine + ?Sized> MapEngine for Box<E> {
    fn prepare_container(&mut self, container_id: &str) -> bool {
        (**self).prepare_container(container_id)
    }

    fn container_ids(&self) -> Vec<String> {
        (**self).container_ids()
    }

    fn create_map(&mut self, options: &MapOptions) -> Result<MapHandle> {
        (**self).create_map(options)
    }

    fn add_control(
        &mut self,
        map: MapHandle,
        control: &Control,
        position: ControlPosition,
    ) -> Result<()> {
        (**self).add_control(map, control, position)
    }

    fn resize(&mut self, map: MapHandle) -> Result<()> {
        (**self).resize(map)
    }

    fn container_size(&self, map: MapHandle) -> Option<(u32, u32)> {
        (**self).container_size(map)
    }

    fn remove_map(&mut self, map: MapHandle) {
        (**self).remove_map(map)
    }

    fn register_window_resize_listener(&mut self) {
        (**self).register_window_resize_listener()
    }

    fn add_marker(
        &mut self,
        map: MapHandle,
        position: LatLng,
        icon: &MarkerIcon,
    ) -> Result<MarkerHandle> {
        (**self).add_marker(map, position, icon)
    }

    fn set_popup(
        &mut self,
        marker: MarkerHandle,
        content: &PopupContent,
        options: &PopupOptions,
    ) -> Result<()> {
        (**self).set_popup(marker, content, options)
    }

    fn show_popup(&mut self, map: MapHandle, marker: MarkerHandle) {
        (**self).show_popup(map, marker)
    }

    fn hide_popup(&mut self, marker: MarkerHandle) {
        (**self).hide_popup(marker)
    }

    fn is_popup_hovered(&self, marker: MarkerHandle) -> bool {
        (**self).is_popup_hovered(marker)
    }

    fn remove_marker(&mut self, marker: MarkerHandle) {
        (**self).remove_marker(marker)
    }
}
