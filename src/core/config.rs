//! Map configuration for butterfly-map
//!
//! Defaults reproduce the merchant map as it ships in the mobile app:
//! streets style, controls in the bottom-right corner, basket icons.

use std::time::Duration;

use serde::Serialize;

/// Environment variable overriding the map style URL
pub const STYLE_ENV: &str = "BUTTERFLY_MAP_STYLE";

/// Environment variable providing the engine access token
pub const ACCESS_TOKEN_ENV: &str = "BUTTERFLY_MAP_ACCESS_TOKEN";

/// Corner of the map a control is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Options for the user-location control
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeolocateOptions {
    pub enable_high_accuracy: bool,
    pub track_user_location: bool,
    pub show_user_heading: bool,
    pub show_user_location: bool,
}

impl Default for GeolocateOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            track_user_location: true,
            show_user_heading: true,
            show_user_location: true,
        }
    }
}

/// Options passed to the engine when a popup is bound to a marker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopupOptions {
    /// Pixel offset between the marker anchor and the popup
    pub offset: u32,
    pub close_button: bool,
}

impl Default for PopupOptions {
    fn default() -> Self {
        Self {
            offset: 25,
            close_button: false,
        }
    }
}

/// Configuration for the map view and its merchant markers
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Style URL handed to the engine on construction
    pub style_url: String,

    /// Access token for hosted engines, if any
    pub access_token: Option<String>,

    /// Highest zoom level the engine accepts
    pub max_zoom: f64,

    /// Keep the drawing buffer so the map can be captured as an image
    pub preserve_drawing_buffer: bool,

    /// Construct the map even on slow rendering back-ends
    pub fail_if_major_performance_caveat: bool,

    /// Where navigation and geolocate controls go
    pub control_position: ControlPosition,

    /// `None` disables the user-location control
    pub geolocate: Option<GeolocateOptions>,

    /// Delay between the ready notification and the first resize
    pub load_resize_delay: Duration,

    /// Delay between a window resize and the map resize
    pub window_resize_delay: Duration,

    /// Hover debounce before a popup is dismissed
    pub popup_dismiss_delay: Duration,

    pub popup: PopupOptions,

    /// Marker icon and the image used when it fails to load
    pub marker_icon: String,
    pub marker_fallback_icon: String,

    /// Appended to the formatted price in popups
    pub currency_symbol: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            style_url: "mapbox://styles/mapbox/streets-v11".to_string(),
            access_token: None,
            max_zoom: 22.0,
            preserve_drawing_buffer: true,
            fail_if_major_performance_caveat: false,
            control_position: ControlPosition::BottomRight,
            geolocate: Some(GeolocateOptions::default()),
            load_resize_delay: Duration::from_millis(200),
            window_resize_delay: Duration::from_millis(100),
            popup_dismiss_delay: Duration::from_millis(300),
            popup: PopupOptions::default(),
            marker_icon: "assets/basket_icon.png".to_string(),
            marker_fallback_icon: "assets/fallback_basket_icon.png".to_string(),
            currency_symbol: "€".to_string(),
        }
    }
}

impl MapConfig {
    /// Defaults overlaid with the `BUTTERFLY_MAP_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (environment, settings file, ...)
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(style) = lookup(STYLE_ENV).filter(|s| !s.trim().is_empty()) {
            self.style_url = style;
        }
        if let Some(token) = lookup(ACCESS_TOKEN_ENV).filter(|s| !s.trim().is_empty()) {
            self.access_token = Some(token);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MapConfig::default();
        assert_eq!(config.style_url, "mapbox://styles/mapbox/streets-v11");
        assert_eq!(config.popup_dismiss_delay, Duration::from_millis(300));
        assert_eq!(config.load_resize_delay, Duration::from_millis(200));
        assert_eq!(config.control_position, ControlPosition::BottomRight);
        assert!(config.geolocate.is_some());
        assert!(config.access_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = MapConfig::default().with_overrides(|key| match key {
            STYLE_ENV => Some("https://tiles.example.org/style.json".to_string()),
            ACCESS_TOKEN_ENV => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.style_url, "https://tiles.example.org/style.json");
        assert!(config.access_token.is_none());
    }
}
