//! In-memory map engine
//!
//! Records every call the controller makes so it can run without a display:
//! the CLI uses it to lay merchants out, tests use it to observe the engine side.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::core::config::{ControlPosition, PopupOptions};
use crate::core::engine::{Control, MapEngine, MapHandle, MapOptions, MarkerHandle, MarkerIcon};
use crate::core::error::{Error, Result};
use crate::core::geo::LatLng;
use crate::core::merchant::PopupContent;

/// Default container size reported for every map
const DEFAULT_SIZE: (u32, u32) = (1024, 768);

/// State of one map created by the headless engine
#[derive(Debug, Clone)]
pub struct HeadlessMap {
    pub options: MapOptions,
    pub controls: Vec<(Control, ControlPosition)>,
    pub resize_count: u32,
}

/// State of one marker created by the headless engine
#[derive(Debug, Clone)]
pub struct HeadlessMarker {
    pub map: MapHandle,
    pub position: LatLng,
    pub icon: MarkerIcon,
    pub popup: Option<(PopupContent, PopupOptions)>,
    pub popup_visible: bool,
    pub popup_hovered: bool,
}

/// A [`MapEngine`] that keeps maps and markers in memory
#[derive(Debug, Default)]
pub struct HeadlessEngine {
    containers: BTreeSet<String>,
    maps: BTreeMap<MapHandle, HeadlessMap>,
    markers: BTreeMap<MarkerHandle, HeadlessMarker>,
    next_id: u64,
    resize_listeners: u32,
    fail_next_map: Option<String>,
    fail_marker_after: Option<usize>,
    fail_controls: bool,
}

impl HeadlessEngine {
    /// Engine with the given containers available
    pub fn with_containers<I, S>(containers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            containers: containers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Make the next `create_map` fail with `message`
    pub fn fail_next_map(&mut self, message: &str) {
        self.fail_next_map = Some(message.to_string());
    }

    /// Make every `add_control` fail
    pub fn fail_controls(&mut self) {
        self.fail_controls = true;
    }

    /// Let `count` more markers succeed, then fail every `add_marker`
    pub fn fail_markers_after(&mut self, count: usize) {
        self.fail_marker_after = Some(count);
    }

    /// Simulate the pointer moving onto or off a marker's popup
    pub fn set_popup_hovered(&mut self, marker: MarkerHandle, hovered: bool) {
        if let Some(m) = self.markers.get_mut(&marker) {
            m.popup_hovered = hovered;
        }
    }

    pub fn map(&self, handle: MapHandle) -> Option<&HeadlessMap> {
        self.maps.get(&handle)
    }

    pub fn live_maps(&self) -> usize {
        self.maps.len()
    }

    pub fn marker(&self, handle: MarkerHandle) -> Option<&HeadlessMarker> {
        self.markers.get(&handle)
    }

    pub fn live_markers(&self) -> usize {
        self.markers.len()
    }

    pub fn resize_listeners(&self) -> u32 {
        self.resize_listeners
    }

    fn next_handle(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn map_mut(&mut self, handle: MapHandle) -> Result<&mut HeadlessMap> {
        self.maps
            .get_mut(&handle)
            .ok_or_else(|| Error::MapEngine(format!("{handle} has been removed")))
    }
}

impl MapEngine for HeadlessEngine {
    fn prepare_container(&mut self, container_id: &str) -> bool {
        self.containers.contains(container_id)
    }

    fn container_ids(&self) -> Vec<String> {
        self.containers.iter().cloned().collect()
    }

    fn create_map(&mut self, options: &MapOptions) -> Result<MapHandle> {
        if let Some(message) = self.fail_next_map.take() {
            return Err(Error::MapEngine(message));
        }
        let handle = MapHandle(self.next_handle());
        debug!("Headless engine created {handle} in '{}'", options.container_id);
        self.maps.insert(
            handle,
            HeadlessMap {
                options: options.clone(),
                controls: Vec::new(),
                resize_count: 0,
            },
        );
        Ok(handle)
    }

    fn add_control(
        &mut self,
        map: MapHandle,
        control: &Control,
        position: ControlPosition,
    ) -> Result<()> {
        if self.fail_controls {
            return Err(Error::MapEngine(format!("{control:?} control rejected")));
        }
        self.map_mut(map)?.controls.push((control.clone(), position));
        Ok(())
    }

    fn resize(&mut self, map: MapHandle) -> Result<()> {
        self.map_mut(map)?.resize_count += 1;
        Ok(())
    }

    fn container_size(&self, map: MapHandle) -> Option<(u32, u32)> {
        self.maps.get(&map).map(|_| DEFAULT_SIZE)
    }

    fn remove_map(&mut self, map: MapHandle) {
        self.maps.remove(&map);
        // Markers go away with their map
        self.markers.retain(|_, m| m.map != map);
    }

    fn register_window_resize_listener(&mut self) {
        self.resize_listeners += 1;
    }

    fn add_marker(
        &mut self,
        map: MapHandle,
        position: LatLng,
        icon: &MarkerIcon,
    ) -> Result<MarkerHandle> {
        if let Some(remaining) = self.fail_marker_after.as_mut() {
            if *remaining == 0 {
                return Err(Error::MapEngine("marker construction failed".to_string()));
            }
            *remaining -= 1;
        }
        if !self.maps.contains_key(&map) {
            return Err(Error::MapEngine(format!("{map} has been removed")));
        }
        let handle = MarkerHandle(self.next_handle());
        self.markers.insert(
            handle,
            HeadlessMarker {
                map,
                position,
                icon: icon.clone(),
                popup: None,
                popup_visible: false,
                popup_hovered: false,
            },
        );
        Ok(handle)
    }

    fn set_popup(
        &mut self,
        marker: MarkerHandle,
        content: &PopupContent,
        options: &PopupOptions,
    ) -> Result<()> {
        let m = self
            .markers
            .get_mut(&marker)
            .ok_or_else(|| Error::MapEngine(format!("{marker} has been removed")))?;
        m.popup = Some((content.clone(), options.clone()));
        Ok(())
    }

    fn show_popup(&mut self, _map: MapHandle, marker: MarkerHandle) {
        if let Some(m) = self.markers.get_mut(&marker) {
            m.popup_visible = m.popup.is_some();
        }
    }

    fn hide_popup(&mut self, marker: MarkerHandle) {
        if let Some(m) = self.markers.get_mut(&marker) {
            m.popup_visible = false;
        }
    }

    fn is_popup_hovered(&self, marker: MarkerHandle) -> bool {
        self.markers.get(&marker).is_some_and(|m| m.popup_hovered)
    }

    fn remove_marker(&mut self, marker: MarkerHandle) {
        self.markers.remove(&marker);
    }
}
