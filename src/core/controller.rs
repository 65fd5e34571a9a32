//! Map view controller
//!
//! Owns the single map view and the merchant markers placed on it. Every
//! operation may be called in any order: without a map, `resize`, `teardown`
//! and `clear_merchant_markers` do nothing, while `add_merchants` reports
//! [`Error::MapNotInitialized`].

use log::{debug, error, info, warn};
use tokio::time::Instant;

use crate::core::config::MapConfig;
use crate::core::engine::{Control, MapEngine, MapEvent, MapHandle, MapOptions, MarkerHandle, MarkerIcon};
use crate::core::error::{suggest_container, Error, Result};
use crate::core::geo::{validate_zoom, LatLng};
use crate::core::merchant::{parse_merchants, Marker, MerchantInput, PopupContent};
use crate::core::schedule::{DeferredAction, DeferredQueue};

/// The map currently owned by the controller
#[derive(Debug, Clone, Copy)]
struct ActiveMap {
    handle: MapHandle,
    generation: u64,
    loaded: bool,
}

/// A marker together with the engine handle it lives under
#[derive(Debug, Clone)]
pub struct PlacedMarker {
    pub handle: MarkerHandle,
    pub marker: Marker,
}

/// Controller for one map view and its merchant markers
pub struct MapViewController<E: MapEngine> {
    engine: E,
    config: MapConfig,
    map: Option<ActiveMap>,
    markers: Vec<PlacedMarker>,
    generation: u64,
    deferred: DeferredQueue,
    resize_listener_registered: bool,
}

impl<E: MapEngine> MapViewController<E> {
    /// Create a controller with the default configuration
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, MapConfig::default())
    }

    /// Create a controller with a custom configuration
    pub fn with_config(engine: E, config: MapConfig) -> Self {
        Self {
            engine,
            config,
            map: None,
            markers: Vec::new(),
            generation: 0,
            deferred: DeferredQueue::new(),
            resize_listener_registered: false,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Handle of the live map, if any
    pub fn handle(&self) -> Option<MapHandle> {
        self.map.map(|m| m.handle)
    }

    /// Whether the live map has delivered its ready notification
    pub fn is_loaded(&self) -> bool {
        self.map.is_some_and(|m| m.loaded)
    }

    /// Markers currently on the map, in placement order
    pub fn markers(&self) -> &[PlacedMarker] {
        &self.markers
    }

    /// Number of deferred actions still waiting
    pub fn pending_actions(&self) -> usize {
        self.deferred.len()
    }

    /// Create the map view, replacing any existing one
    pub fn initialize(&mut self, container_id: &str, lat: f64, lon: f64, zoom: f64) -> Result<MapHandle> {
        let center = LatLng::new(lat, lon)?;
        let zoom = validate_zoom(zoom, self.config.max_zoom)?;

        if !self.engine.prepare_container(container_id) {
            let suggestion = suggest_container(container_id, &self.engine.container_ids());
            return Err(Error::ContainerNotFound {
                container_id: container_id.to_string(),
                suggestion,
            });
        }

        self.teardown();

        let options = MapOptions {
            container_id: container_id.to_string(),
            style_url: self.config.style_url.clone(),
            access_token: self.config.access_token.clone(),
            center,
            zoom,
            preserve_drawing_buffer: self.config.preserve_drawing_buffer,
            fail_if_major_performance_caveat: self.config.fail_if_major_performance_caveat,
        };
        let handle = self.engine.create_map(&options)?;

        self.generation += 1;
        self.map = Some(ActiveMap {
            handle,
            generation: self.generation,
            loaded: false,
        });

        if !self.resize_listener_registered {
            self.engine.register_window_resize_listener();
            self.resize_listener_registered = true;
        }

        info!("Map {handle} created in '{container_id}' at ({lat}, {lon}) zoom {zoom}");
        Ok(handle)
    }

    /// Re-measure the container; no-op without a map
    pub fn resize(&mut self) -> Result<()> {
        let Some(map) = self.map else {
            return Ok(());
        };
        if let Some((width, height)) = self.engine.container_size(map.handle) {
            debug!("Resizing map to {width}x{height}");
        }
        self.engine.resize(map.handle)
    }

    /// Release the map and its markers; no-op without a map
    pub fn teardown(&mut self) {
        let Some(map) = self.map.take() else {
            return;
        };
        info!("Removing map instance {}", map.handle);
        self.clear_merchant_markers();
        self.engine.remove_map(map.handle);
        // Anything still scheduled for this map is now stale
        self.generation += 1;
    }

    /// Replace all markers with the merchants in `json`
    pub fn add_merchants(&mut self, json: &str) -> Result<()> {
        self.require_loaded()?;
        self.clear_merchant_markers();
        let merchants = parse_merchants(json)?;
        self.place_merchants(merchants)
    }

    /// Remove every marker; works with or without a map
    pub fn clear_merchant_markers(&mut self) {
        if self.markers.is_empty() {
            return;
        }
        debug!("Clearing {} merchant markers", self.markers.len());
        for placed in self.markers.drain(..) {
            self.engine.remove_marker(placed.handle);
        }
    }

    /// Deliver an engine or host notification
    pub fn handle_event(&mut self, event: MapEvent) -> Result<()> {
        match event {
            MapEvent::Loaded(handle) => self.on_loaded(handle),
            MapEvent::EngineError { map, message } => {
                if self.handle() == Some(map) {
                    error!("Map engine error on {map}: {message}");
                } else {
                    debug!("Ignoring error from stale {map}: {message}");
                }
                Ok(())
            }
            MapEvent::WindowResized => {
                if let Some(map) = self.map {
                    self.deferred.schedule(
                        Instant::now(),
                        self.config.window_resize_delay,
                        map.generation,
                        DeferredAction::Resize,
                    );
                }
                Ok(())
            }
            MapEvent::MarkerPointerEnter(marker) => {
                if let (Some(map), true) = (self.map, self.owns_marker(marker)) {
                    self.engine.show_popup(map.handle, marker);
                }
                Ok(())
            }
            MapEvent::MarkerPointerLeave(marker) => {
                if let (Some(map), true) = (self.map, self.owns_marker(marker)) {
                    self.deferred.schedule(
                        Instant::now(),
                        self.config.popup_dismiss_delay,
                        map.generation,
                        DeferredAction::DismissPopup(marker),
                    );
                }
                Ok(())
            }
        }
    }

    /// Earliest deadline among deferred actions
    pub fn next_due(&self) -> Option<Instant> {
        self.deferred.next_due()
    }

    /// Run every deferred action due at `now`
    ///
    /// Actions scheduled under an older map generation are dropped.
    pub fn run_due(&mut self, now: Instant) {
        for deferred in self.deferred.take_due(now) {
            let current = self.map.map(|m| m.generation);
            if current != Some(deferred.generation) {
                debug!("Dropping stale {:?}", deferred.action);
                continue;
            }

            match deferred.action {
                DeferredAction::Resize => {
                    if let Err(e) = self.resize() {
                        error!("Error resizing map: {e}");
                    }
                }
                DeferredAction::DismissPopup(marker) => {
                    if self.owns_marker(marker) && !self.engine.is_popup_hovered(marker) {
                        self.engine.hide_popup(marker);
                    }
                }
            }
        }
    }

    fn on_loaded(&mut self, handle: MapHandle) -> Result<()> {
        let Some(map) = self.map.as_mut().filter(|m| m.handle == handle) else {
            debug!("Ignoring load notification from stale {handle}");
            return Ok(());
        };
        if map.loaded {
            return Ok(());
        }
        map.loaded = true;
        let generation = map.generation;

        self.deferred.schedule(
            Instant::now(),
            self.config.load_resize_delay,
            generation,
            DeferredAction::Resize,
        );

        // Rejected controls are logged; the load still succeeds
        let position = self.config.control_position;
        let mut controls = vec![Control::Navigation];
        if let Some(geolocate) = &self.config.geolocate {
            controls.push(Control::Geolocate(geolocate.clone()));
        }
        for control in &controls {
            if let Err(e) = self.engine.add_control(handle, control, position) {
                warn!("Could not add {control:?} control to {handle}: {e}");
            }
        }
        info!("Map {handle} loaded");
        Ok(())
    }

    fn require_loaded(&self) -> Result<MapHandle> {
        match self.map {
            Some(map) if map.loaded => Ok(map.handle),
            Some(map) => {
                warn!("Map {} has not finished loading", map.handle);
                Err(Error::MapNotInitialized)
            }
            None => Err(Error::MapNotInitialized),
        }
    }

    fn owns_marker(&self, marker: MarkerHandle) -> bool {
        self.markers.iter().any(|p| p.handle == marker)
    }

    fn place_merchants(&mut self, merchants: Vec<MerchantInput>) -> Result<()> {
        let map = self.require_loaded()?;
        info!("Adding {} merchants to map", merchants.len());

        for input in merchants {
            if let Err(e) = self.place_one(map, input) {
                // Leave no partial list behind
                self.clear_merchant_markers();
                return Err(e);
            }
        }
        Ok(())
    }

    fn place_one(&mut self, map: MapHandle, input: MerchantInput) -> Result<()> {
        let marker = Marker::try_from(input)?;
        let icon = MarkerIcon {
            src: self.config.marker_icon.clone(),
            fallback_src: self.config.marker_fallback_icon.clone(),
            alt: marker.display.name.clone(),
        };
        let handle = self.engine.add_marker(map, marker.position, &icon)?;

        let popup = PopupContent::for_merchant(&marker.display, &self.config.currency_symbol);
        if let Err(e) = self.engine.set_popup(handle, &popup, &self.config.popup) {
            self.engine.remove_marker(handle);
            return Err(e);
        }

        self.markers.push(PlacedMarker { handle, marker });
        Ok(())
    }
}

impl<E: MapEngine> Drop for MapViewController<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::headless::HeadlessEngine;
    use std::time::Duration;

    const ONE: &str =
        r#"[{"name":"A","latitude":48.86,"longitude":2.36,"availableBaskets":3,"price":5.5}]"#;
    const TWO: &str = r#"[
        {"name":"B","latitude":48.87,"longitude":2.37,"availableBaskets":1,"price":3},
        {"name":"C","latitude":48.88,"longitude":2.38,"availableBaskets":2,"price":4.25}
    ]"#;

    fn loaded_controller() -> (MapViewController<HeadlessEngine>, MapHandle) {
        let mut controller = MapViewController::new(HeadlessEngine::with_containers(["map"]));
        let handle = controller.initialize("map", 48.85, 2.35, 12.0).unwrap();
        controller.handle_event(MapEvent::Loaded(handle)).unwrap();
        (controller, handle)
    }

    fn later(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[test]
    fn test_initialize_replaces_previous_map() {
        let (mut controller, first) = loaded_controller();
        controller.add_merchants(ONE).unwrap();

        let second = controller.initialize("map", 50.0, 4.0, 10.0).unwrap();
        assert_ne!(first, second);
        assert_eq!(controller.handle(), Some(second));
        assert!(controller.markers().is_empty());
        assert!(!controller.is_loaded());
        assert_eq!(controller.engine().live_maps(), 1);
        assert_eq!(controller.engine().live_markers(), 0);
    }

    #[test]
    fn test_resize_listener_registered_once() {
        let mut controller = MapViewController::new(HeadlessEngine::with_containers(["map"]));
        for _ in 0..3 {
            controller.initialize("map", 0.0, 0.0, 1.0).unwrap();
        }
        controller.teardown();
        controller.initialize("map", 0.0, 0.0, 1.0).unwrap();
        assert_eq!(controller.engine().resize_listeners(), 1);
    }

    #[test]
    fn test_initialize_missing_container() {
        let mut controller = MapViewController::new(HeadlessEngine::with_containers(["merchant-map"]));
        let err = controller.initialize("merchant-mpa", 0.0, 0.0, 1.0).unwrap_err();
        match err {
            Error::ContainerNotFound { container_id, suggestion } => {
                assert_eq!(container_id, "merchant-mpa");
                assert_eq!(suggestion.as_deref(), Some("merchant-map"));
            }
            other => panic!("Expected ContainerNotFound, got {other:?}"),
        }
        assert_eq!(controller.handle(), None);
        assert_eq!(controller.engine().resize_listeners(), 0);
    }

    #[test]
    fn test_missing_container_keeps_existing_map() {
        let (mut controller, handle) = loaded_controller();
        controller.add_merchants(ONE).unwrap();
        assert!(controller.initialize("elsewhere", 0.0, 0.0, 1.0).is_err());
        assert_eq!(controller.handle(), Some(handle));
        assert_eq!(controller.markers().len(), 1);
    }

    #[test]
    fn test_initialize_rejects_bad_parameters_without_teardown() {
        let (mut controller, handle) = loaded_controller();
        assert!(matches!(
            controller.initialize("map", 120.0, 0.0, 1.0),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            controller.initialize("map", 0.0, 0.0, 40.0),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(controller.handle(), Some(handle));
    }

    #[test]
    fn test_engine_failure_leaves_no_map() {
        let mut controller = MapViewController::new(HeadlessEngine::with_containers(["map"]));
        controller.engine_mut().fail_next_map("webgl unavailable");
        assert!(matches!(
            controller.initialize("map", 0.0, 0.0, 1.0),
            Err(Error::MapEngine(_))
        ));
        assert_eq!(controller.handle(), None);
    }

    #[test]
    fn test_load_installs_controls_and_schedules_resize() {
        let (mut controller, handle) = loaded_controller();
        let map = controller.engine().map(handle).unwrap();
        assert_eq!(map.controls.len(), 2);
        assert_eq!(map.controls[0].0, Control::Navigation);
        assert_eq!(controller.pending_actions(), 1);

        controller.run_due(later(100));
        assert_eq!(controller.engine().map(handle).unwrap().resize_count, 0);
        controller.run_due(later(250));
        assert_eq!(controller.engine().map(handle).unwrap().resize_count, 1);
    }

    #[test]
    fn test_duplicate_load_is_ignored() {
        let (mut controller, handle) = loaded_controller();
        controller.handle_event(MapEvent::Loaded(handle)).unwrap();
        assert_eq!(controller.engine().map(handle).unwrap().controls.len(), 2);
        assert_eq!(controller.pending_actions(), 1);
    }

    #[test]
    fn test_geolocate_control_can_be_disabled() {
        let config = MapConfig {
            geolocate: None,
            ..Default::default()
        };
        let mut controller =
            MapViewController::with_config(HeadlessEngine::with_containers(["map"]), config);
        let handle = controller.initialize("map", 0.0, 0.0, 1.0).unwrap();
        controller.handle_event(MapEvent::Loaded(handle)).unwrap();
        assert_eq!(controller.engine().map(handle).unwrap().controls.len(), 1);
    }

    #[test]
    fn test_rejected_controls_still_resize_after_load() {
        let mut controller = MapViewController::new(HeadlessEngine::with_containers(["map"]));
        controller.engine_mut().fail_controls();
        let handle = controller.initialize("map", 0.0, 0.0, 1.0).unwrap();

        assert!(controller.handle_event(MapEvent::Loaded(handle)).is_ok());
        assert!(controller.is_loaded());
        assert!(controller.engine().map(handle).unwrap().controls.is_empty());
        assert_eq!(controller.pending_actions(), 1);

        controller.run_due(later(250));
        assert_eq!(controller.engine().map(handle).unwrap().resize_count, 1);
        assert!(controller.add_merchants(ONE).is_ok());
    }

    #[test]
    fn test_stale_resize_after_teardown_is_dropped() {
        let (mut controller, _) = loaded_controller();
        controller.teardown();
        let replacement = controller.initialize("map", 0.0, 0.0, 1.0).unwrap();

        controller.run_due(later(1_000));
        assert_eq!(controller.engine().map(replacement).unwrap().resize_count, 0);
        assert_eq!(controller.pending_actions(), 0);
    }

    #[test]
    fn test_window_resize_is_deferred() {
        let (mut controller, handle) = loaded_controller();
        controller.run_due(later(250));
        controller.handle_event(MapEvent::WindowResized).unwrap();
        controller.run_due(later(150));
        assert_eq!(controller.engine().map(handle).unwrap().resize_count, 2);

        controller.teardown();
        controller.handle_event(MapEvent::WindowResized).unwrap();
        assert_eq!(controller.pending_actions(), 0);
    }

    #[test]
    fn test_pointer_and_resize_storms_stay_bounded() {
        let (mut controller, _) = loaded_controller();
        controller.add_merchants(ONE).unwrap();
        let marker = controller.markers()[0].handle;

        for _ in 0..500 {
            controller.handle_event(MapEvent::MarkerPointerEnter(marker)).unwrap();
            controller.handle_event(MapEvent::MarkerPointerLeave(marker)).unwrap();
            controller.handle_event(MapEvent::WindowResized).unwrap();
        }
        // One resize (the post-load one was superseded) and one dismissal
        assert_eq!(controller.pending_actions(), 2);
    }

    #[test]
    fn test_teardown_twice() {
        let (mut controller, _) = loaded_controller();
        controller.add_merchants(ONE).unwrap();
        controller.teardown();
        controller.teardown();
        assert_eq!(controller.handle(), None);
        assert!(controller.markers().is_empty());
        assert_eq!(controller.engine().live_maps(), 0);
    }

    #[test]
    fn test_guarded_no_ops_without_map() {
        let mut controller = MapViewController::new(HeadlessEngine::with_containers(["map"]));
        controller.resize().unwrap();
        controller.clear_merchant_markers();
        controller.teardown();
        assert_eq!(controller.handle(), None);
        assert!(controller.markers().is_empty());
        assert_eq!(controller.pending_actions(), 0);
    }

    #[test]
    fn test_add_merchants_requires_map() {
        let mut controller = MapViewController::new(HeadlessEngine::with_containers(["map"]));
        assert!(matches!(controller.add_merchants(ONE), Err(Error::MapNotInitialized)));
        assert!(controller.markers().is_empty());
    }

    #[test]
    fn test_add_merchants_waits_for_load() {
        let (mut controller, _) = loaded_controller();
        controller.add_merchants(ONE).unwrap();

        let handle = controller.initialize("map", 0.0, 0.0, 1.0).unwrap();
        assert!(matches!(controller.add_merchants(TWO), Err(Error::MapNotInitialized)));
        controller.handle_event(MapEvent::Loaded(handle)).unwrap();
        controller.add_merchants(TWO).unwrap();
        assert_eq!(controller.markers().len(), 2);
    }

    #[test]
    fn test_add_merchants_full_replace() {
        let (mut controller, _) = loaded_controller();
        controller.add_merchants(ONE).unwrap();
        controller.add_merchants(TWO).unwrap();

        let names: Vec<_> = controller
            .markers()
            .iter()
            .map(|p| p.marker.display.name.as_str())
            .collect();
        assert_eq!(names, ["B", "C"]);
        assert_eq!(controller.engine().live_markers(), 2);
    }

    #[test]
    fn test_duplicate_positions_allowed() {
        let (mut controller, _) = loaded_controller();
        let json = r#"[
            {"name":"A","latitude":1,"longitude":1,"availableBaskets":1,"price":1},
            {"name":"A","latitude":1,"longitude":1,"availableBaskets":1,"price":1}
        ]"#;
        controller.add_merchants(json).unwrap();
        assert_eq!(controller.markers().len(), 2);
    }

    #[test]
    fn test_malformed_input_clears_and_places_nothing() {
        let (mut controller, _) = loaded_controller();
        controller.add_merchants(ONE).unwrap();

        assert!(matches!(
            controller.add_merchants("[{\"name\":"),
            Err(Error::MalformedInput(_))
        ));
        assert!(controller.markers().is_empty());
        assert_eq!(controller.engine().live_markers(), 0);
    }

    #[test]
    fn test_engine_failure_rolls_back_placement() {
        let (mut controller, _) = loaded_controller();
        controller.engine_mut().fail_markers_after(1);
        assert!(matches!(controller.add_merchants(TWO), Err(Error::MapEngine(_))));
        assert!(controller.markers().is_empty());
        assert_eq!(controller.engine().live_markers(), 0);
    }

    #[test]
    fn test_popup_carries_display_data() {
        let (mut controller, _) = loaded_controller();
        controller.add_merchants(ONE).unwrap();

        let placed = &controller.markers()[0];
        let marker = controller.engine().marker(placed.handle).unwrap();
        let (content, options) = marker.popup.as_ref().unwrap();
        assert_eq!(content.title, "A");
        assert_eq!(content.price, "5.50 €");
        assert_eq!(options.offset, 25);
        assert!(!options.close_button);
        assert_eq!(marker.icon.src, "assets/basket_icon.png");
        assert_eq!(marker.icon.alt, "A");
    }

    #[test]
    fn test_hover_shows_and_debounces_dismissal() {
        let (mut controller, _) = loaded_controller();
        controller.add_merchants(ONE).unwrap();
        let marker = controller.markers()[0].handle;

        controller.handle_event(MapEvent::MarkerPointerEnter(marker)).unwrap();
        assert!(controller.engine().marker(marker).unwrap().popup_visible);

        controller.handle_event(MapEvent::MarkerPointerLeave(marker)).unwrap();
        controller.run_due(later(250));
        assert!(controller.engine().marker(marker).unwrap().popup_visible);

        controller.run_due(later(350));
        assert!(!controller.engine().marker(marker).unwrap().popup_visible);
    }

    #[test]
    fn test_hovered_popup_stays_open() {
        let (mut controller, _) = loaded_controller();
        controller.add_merchants(ONE).unwrap();
        let marker = controller.markers()[0].handle;

        controller.handle_event(MapEvent::MarkerPointerEnter(marker)).unwrap();
        controller.handle_event(MapEvent::MarkerPointerLeave(marker)).unwrap();
        controller.engine_mut().set_popup_hovered(marker, true);
        controller.run_due(later(400));
        assert!(controller.engine().marker(marker).unwrap().popup_visible);
    }

    #[test]
    fn test_dismissal_for_cleared_marker_is_dropped() {
        let (mut controller, _) = loaded_controller();
        controller.add_merchants(ONE).unwrap();
        let marker = controller.markers()[0].handle;

        controller.handle_event(MapEvent::MarkerPointerLeave(marker)).unwrap();
        controller.clear_merchant_markers();
        controller.run_due(later(400));
        assert!(controller.engine().marker(marker).is_none());
        assert_eq!(controller.pending_actions(), 0);
    }

    #[test]
    fn test_events_for_unknown_markers_are_ignored() {
        let (mut controller, _) = loaded_controller();
        controller
            .handle_event(MapEvent::MarkerPointerLeave(MarkerHandle(999)))
            .unwrap();
        assert_eq!(controller.pending_actions(), 1);
    }

    #[test]
    fn test_engine_error_keeps_map() {
        let (mut controller, handle) = loaded_controller();
        controller
            .handle_event(MapEvent::EngineError {
                map: handle,
                message: "tile 404".to_string(),
            })
            .unwrap();
        assert_eq!(controller.handle(), Some(handle));
        assert!(controller.is_loaded());
    }
}
